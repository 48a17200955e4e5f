/*!
The HTTP console: routing, cookie sessions, and middleware.

Every browser session owns a [`ConsoleSession`]: its own [`AuthState`] and
[`Dashboard`]. They are kept in [`AppState`] under the session token that the
`session` cookie carries. Page handlers answer with server-rendered
handlebars pages and report outcomes by redirecting with `notice`, `detail`
and `variant` query parameters.
*/
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use axum::{
    Extension, Form, Json, Router,
    body::Body,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::auth::{AuthProvider, LocalAuth};
use crate::config::Cfg;
use crate::dashboard::{ALL, Dashboard, PaymentFilter, selector};
use crate::error::{Error, Result};
use crate::export::{self, PaymentReportRow, PowerBiRow};
use crate::model::{Course, Payment, PaymentType, Record, Role, School, User};
use crate::repo::Repo;
use crate::session::AuthState;
use crate::store::{DataService, LocalStore};
use crate::table::{self, Column, Pager, TableView};
use crate::users::{UserAdmin, UserForm};
use crate::view::{ListView, Notice, Variant};

const SESSION_COOKIE: &str = "session";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Per-browser console state.
pub struct ConsoleSession {
    pub auth: AuthState,
    pub dashboard: Dashboard,
}

pub struct AppState {
    data: Arc<dyn DataService>,
    auth: Arc<dyn AuthProvider>,
    consoles: RwLock<HashMap<String, Arc<ConsoleSession>>>,
    templates: Handlebars<'static>,
    cfg: Cfg,
}

impl AppState {
    pub fn new(cfg: Cfg, data: Arc<dyn DataService>, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates.register_partial("header", include_str!("./templates/header.hbs"))?;
        templates.register_partial("footer", include_str!("./templates/footer.hbs"))?;
        templates.register_partial("table", include_str!("./templates/table.hbs"))?;
        templates.register_partial("form", include_str!("./templates/form.hbs"))?;
        templates.register_template_string("login", include_str!("./templates/login.hbs"))?;
        templates.register_template_string("dashboard", include_str!("./templates/dashboard.hbs"))?;
        templates.register_template_string("entities", include_str!("./templates/entities.hbs"))?;
        templates.register_template_string("payments_table", "{{> table}}")?;

        Ok(AppState {
            data,
            auth,
            consoles: RwLock::new(HashMap::new()),
            templates,
            cfg,
        })
    }

    fn console(&self, token: &str) -> Option<Arc<ConsoleSession>> {
        let consoles = self.consoles.read().unwrap_or_else(|e| e.into_inner());
        consoles.get(token).cloned()
    }

    fn open_console(&self) -> ConsoleSession {
        ConsoleSession {
            auth: AuthState::new(Arc::clone(&self.auth), Arc::clone(&self.data)),
            dashboard: Dashboard::new(Arc::clone(&self.data)).with_debounce(self.cfg.search_debounce),
        }
    }

    /// Stores `console` under `token`, dropping consoles whose session has
    /// expired or been signed out.
    fn keep_console(&self, token: String, console: ConsoleSession) {
        let mut consoles = self.consoles.write().unwrap_or_else(|e| e.into_inner());
        consoles.retain(|t, _| self.auth.session(t).is_some());
        consoles.insert(token, Arc::new(console));
        log::debug!("{} console sessions open", consoles.len());
    }

    pub fn open_consoles(&self) -> usize {
        self.consoles.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn drop_console(&self, token: &str) -> Option<Arc<ConsoleSession>> {
        let mut consoles = self.consoles.write().unwrap_or_else(|e| e.into_inner());
        consoles.remove(token)
    }

    fn serve_template<S: Serialize + Debug>(&self, code: StatusCode, name: &str, data: &S) -> Response {
        log::trace!("serve_template( {}, {:?}, ... ) called.", &code, name);

        match self.templates.render(name, data) {
            Ok(body) => (code, Html(body)).into_response(),
            Err(e) => {
                log::error!("Error rendering template {:?} with data {:?}:\n{}", name, data, &e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Builds the console router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/users", get(list_page::<User>).post(save_user))
        .route("/users/:id/delete", post(delete_user))
        .route("/schools", get(list_page::<School>).post(save_record::<School>))
        .route("/schools/:id/delete", post(delete_record::<School>))
        .route("/courses", get(list_page::<Course>).post(save_record::<Course>))
        .route("/courses/:id/delete", post(delete_record::<Course>))
        .route_layer(middleware::from_fn(require_admin));

    let console = Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/dashboard", get(dashboard_page))
        .route("/api/payments", get(api_payments))
        .route("/payments", post(save_payment))
        .route("/payments/:id/delete", post(delete_payment))
        .route("/export/payments.csv", get(export_report_csv))
        .route("/export/powerbi.csv", get(export_powerbi_csv))
        .route("/export/payments.xlsx", get(export_report_xlsx))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_auth));

    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .merge(console)
        .nest_service("/static", ServeDir::new(&state.cfg.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opens the configured data directory and serves the console until the
/// process is stopped.
pub async fn run(cfg: Cfg) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let data: Arc<dyn DataService> = Arc::new(LocalStore::open(&cfg.data_dir)?);
    let auth: Arc<dyn AuthProvider> =
        Arc::new(LocalAuth::open(&cfg.data_dir)?.with_session_ttl(cfg.session_ttl));

    let addr = cfg.addr;
    let state = Arc::new(AppState::new(cfg, data, auth)?);

    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Sessions and access control
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

fn session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie
}

async fn login_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if state.console(&token).is_some_and(|c| c.auth.user().is_some()) {
            return Redirect::to("/dashboard").into_response();
        }
    }
    state.serve_template(StatusCode::OK, "login", &json!({ "title": "Login" }))
}

/// Handle console sign-in
///
/// Authenticates through a fresh [`ConsoleSession`]. On success the session
/// is kept under its token (replacing any console the browser already had),
/// the `session` cookie is set and the user lands on the dashboard; otherwise
/// the login page is shown again with the error.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Response {
    let console = state.open_console();

    if !console.auth.authenticate(credentials.email.trim(), &credentials.password) {
        let data = json!({
            "title": "Login",
            "email": credentials.email,
            "error": "Invalid login credentials",
        });
        return state.serve_template(StatusCode::UNAUTHORIZED, "login", &data);
    }

    if let Some(previous) = jar.get(SESSION_COOKIE).and_then(|c| state.drop_console(c.value())) {
        previous.auth.deauthenticate();
    }

    let Some(token) = console.auth.token() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Session was not established").into_response();
    };
    log::info!("{} signed in", credentials.email.trim());
    state.keep_console(token.clone(), console);

    (jar.add(session_cookie(token)), Redirect::to("/dashboard")).into_response()
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        match state.drop_console(&token) {
            Some(console) => console.auth.deauthenticate(),
            None => {
                if let Err(e) = state.auth.sign_out(&token) {
                    log::debug!("Sign-out of unknown console failed: {}", &e);
                }
            }
        }
    }

    (jar.remove(session_cookie(String::new())), Redirect::to("/login"))
}

/// Authentication middleware
///
/// Looks up the console for the `session` cookie, applies pending session
/// notifications, and re-resolves the profile so expiry and role changes
/// take effect. Requests without a live user are redirected to `/login`.
async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if let Some(console) = state.console(&token) {
            console.auth.sync();
            console.auth.refresh();
            if console.auth.user().is_some() {
                request.extensions_mut().insert(console);
                return next.run(request).await;
            }
            log::debug!("Console session ended; dropping it");
            state.drop_console(&token);
        }
    }

    Redirect::to("/login").into_response()
}

/// Staff users are sent back to the dashboard.
async fn require_admin(
    Extension(console): Extension<Arc<ConsoleSession>>,
    request: Request,
    next: Next,
) -> Response {
    match console.auth.role() {
        Some(Role::Admin) => next.run(request).await,
        _ => Redirect::to("/dashboard").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Page helpers
// ---------------------------------------------------------------------------

/// Redirects to `path`, carrying `notice` in the query string.
fn redirect_with(path: &str, notice: Option<&Notice>) -> Redirect {
    let Some(n) = notice else {
        return Redirect::to(path);
    };
    let sep = if path.contains('?') { '&' } else { '?' };
    let variant = match n.variant {
        Variant::Default => "default",
        Variant::Destructive => "destructive",
    };
    Redirect::to(&format!(
        "{}{}notice={}&detail={}&variant={}",
        path,
        sep,
        urlencoding::encode(&n.title),
        urlencoding::encode(&n.description),
        variant
    ))
}

fn notice_from(notice: &Option<String>, detail: &Option<String>, variant: &Option<String>) -> Option<Notice> {
    let title = notice.as_deref().filter(|t| !t.is_empty())?;
    let description = detail.clone().unwrap_or_default();
    Some(match variant.as_deref() {
        Some("destructive") => Notice::failure(title, description),
        _ => Notice::success(title, description),
    })
}

fn nav(console: &ConsoleSession, active: &str) -> Value {
    let user = console.auth.user();
    json!({
        "name": user.as_ref().map(|u| u.name.clone()).unwrap_or_default(),
        "role": user.as_ref().map(|u| u.role.to_string()).unwrap_or_default(),
        "is_admin": user.as_ref().is_some_and(|u| u.role == Role::Admin),
        "active": active,
    })
}

#[derive(Debug, Serialize)]
struct Choice {
    value: String,
    selected: bool,
}

fn choices<I: IntoIterator<Item = String>>(values: I, current: Option<&str>) -> Vec<Choice> {
    values
        .into_iter()
        .map(|value| Choice { selected: current == Some(value.as_str()), value })
        .collect()
}

/// One input of an add/edit form.
#[derive(Debug, Serialize)]
struct Field {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
    value: String,
    required: bool,
    readonly: bool,
    options: Vec<Choice>,
}

impl Field {
    fn input(name: &'static str, label: &'static str, kind: &'static str, value: impl Into<String>) -> Self {
        Field {
            name,
            label,
            kind,
            value: value.into(),
            required: true,
            readonly: false,
            options: Vec::new(),
        }
    }

    fn text(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Field::input(name, label, "text", value)
    }

    fn select(name: &'static str, label: &'static str, options: Vec<Choice>) -> Self {
        Field {
            options,
            ..Field::input(name, label, "select", "")
        }
    }

    fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }
}

#[derive(Deserialize)]
struct ConfirmForm {
    #[serde(default)]
    confirm: Option<String>,
}

impl ConfirmForm {
    fn confirmed(&self) -> bool {
        self.confirm.as_deref() == Some("yes")
    }
}

// ---------------------------------------------------------------------------
// Entity pages
// ---------------------------------------------------------------------------

/// A record type with a list page and an add/edit form.
trait Managed: Record {
    const PATH: &'static str;
    const TITLE: &'static str;

    fn columns() -> Vec<Column<Self>>;
    fn fields(current: Option<&Self>) -> Vec<Field>;
}

impl Managed for School {
    const PATH: &'static str = "/schools";
    const TITLE: &'static str = "Schools";

    fn columns() -> Vec<Column<Self>> {
        vec![Column::field("Name", "name"), Column::field("City", "city")]
    }

    fn fields(current: Option<&Self>) -> Vec<Field> {
        vec![
            Field::text("name", "Name", current.map(|s| s.name.clone()).unwrap_or_default()),
            Field::text("city", "City", current.map(|s| s.city.clone()).unwrap_or_default()),
        ]
    }
}

impl Managed for Course {
    const PATH: &'static str = "/courses";
    const TITLE: &'static str = "Courses";

    fn columns() -> Vec<Column<Self>> {
        vec![Column::field("Name", "name"), Column::field("Code", "code")]
    }

    fn fields(current: Option<&Self>) -> Vec<Field> {
        vec![
            Field::text("name", "Name", current.map(|c| c.name.clone()).unwrap_or_default()),
            Field::text("code", "Code", current.map(|c| c.code.clone()).unwrap_or_default()),
        ]
    }
}

impl Managed for User {
    const PATH: &'static str = "/users";
    const TITLE: &'static str = "Users";

    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::field("Name", "name"),
            Column::field("Email", "email"),
            Column::render("Role", |u: &User| u.role.to_string()),
        ]
    }

    fn fields(current: Option<&Self>) -> Vec<Field> {
        let role = current.map(|u| u.role).unwrap_or_default().to_string();
        let mut fields = vec![
            Field::text("name", "Name", current.map(|u| u.name.clone()).unwrap_or_default()),
            Field::input("email", "Email", "email", current.map(|u| u.email.clone()).unwrap_or_default())
                .readonly(current.is_some()),
            Field::select(
                "role",
                "Role",
                choices([Role::Admin, Role::Staff].map(|r| r.to_string()), Some(role.as_str())),
            ),
        ];
        if current.is_none() {
            fields.push(Field::input("password", "Password", "password", ""));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<usize>,
    edit: Option<String>,
    notice: Option<String>,
    detail: Option<String>,
    variant: Option<String>,
}

/// Renders the list page of `T`: one page of the table plus the add/edit
/// form, pre-filled when `edit` names a row.
async fn list_page<T: Managed>(
    State(state): State<Arc<AppState>>,
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<ListParams>,
) -> Response {
    let mut view = ListView::new(Repo::<T>::new(Arc::clone(&state.data)));
    view.load();
    let mut notices = view.take_notices();
    notices.extend(notice_from(&params.notice, &params.detail, &params.variant));

    let editing = params
        .edit
        .as_deref()
        .and_then(|id| view.rows().iter().find(|r| r.id() == Some(id)));

    let pager = Pager::at(params.page.unwrap_or(1), view.rows().len());
    let table = table::render(&T::columns(), view.rows(), &pager);

    let data = json!({
        "title": T::TITLE,
        "label": T::LABEL,
        "base": T::PATH,
        "path": T::PATH,
        "query": "",
        "nav": nav(&console, T::PATH),
        "notices": notices,
        "table": table,
        "form": {
            "id": editing.and_then(|r| r.id()).unwrap_or_default(),
            "editing": editing.is_some(),
            "fields": T::fields(editing),
        },
    });
    state.serve_template(StatusCode::OK, "entities", &data)
}

async fn save_record<T: Managed>(State(state): State<Arc<AppState>>, Form(record): Form<T>) -> Redirect {
    let mut view = ListView::new(Repo::<T>::new(Arc::clone(&state.data)));
    view.save(record);
    let notices = view.take_notices();
    redirect_with(T::PATH, notices.first())
}

fn delete_then_redirect<T: Record>(data: &Arc<dyn DataService>, id: &str, confirm: &ConfirmForm, back: &str) -> Redirect {
    let mut view = ListView::new(Repo::<T>::new(Arc::clone(data)));
    view.delete(id, confirm.confirmed());
    let notices = view.take_notices();
    redirect_with(back, notices.first())
}

async fn delete_record<T: Managed>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(confirm): Form<ConfirmForm>,
) -> Redirect {
    delete_then_redirect::<T>(&state.data, &id, &confirm, T::PATH)
}

async fn save_user(State(state): State<Arc<AppState>>, Form(form): Form<UserForm>) -> Redirect {
    let admin = UserAdmin::new(Arc::clone(&state.auth), Arc::clone(&state.data));
    let updating = form.id.as_deref().is_some_and(|id| !id.is_empty());
    let notice = match admin.save(&form) {
        Ok(user) => {
            let verb = if updating { "updated" } else { "created" };
            log::info!("User {} {}", &user.email, verb);
            Notice::success("User saved", format!("User {} successfully.", verb))
        }
        Err(e) => Notice::failure("Error saving user", e.to_string()),
    };
    redirect_with(User::PATH, Some(&notice))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(confirm): Form<ConfirmForm>,
) -> Redirect {
    if !confirm.confirmed() {
        return Redirect::to(User::PATH);
    }
    let admin = UserAdmin::new(Arc::clone(&state.auth), Arc::clone(&state.data));
    let notice = match admin.delete_user(&id) {
        Ok(()) => Notice::success("User deleted", "User deleted successfully."),
        Err(e) => Notice::failure("Error deleting user", e.to_string()),
    };
    redirect_with(User::PATH, Some(&notice))
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct DashboardParams {
    page: Option<usize>,
    #[serde(default)]
    search: String,
    from: Option<String>,
    to: Option<String>,
    #[serde(rename = "type")]
    payment_type: Option<String>,
    school: Option<String>,
    course: Option<String>,
    edit: Option<String>,
    notice: Option<String>,
    detail: Option<String>,
    variant: Option<String>,
}

fn parse_date(value: &Option<String>) -> Option<NaiveDate> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

impl DashboardParams {
    fn filter(&self) -> PaymentFilter {
        PaymentFilter {
            search: self.search.clone(),
            from: parse_date(&self.from),
            to: parse_date(&self.to),
            payment_type: selector(self.payment_type.as_deref()).and_then(|t| t.parse().ok()),
            school: selector(self.school.as_deref()),
            course: selector(self.course.as_deref()),
        }
    }

    /// The filter part of the query string, for page and export links.
    fn filter_query(&self) -> String {
        let pairs = [
            ("search", Some(self.search.as_str())),
            ("from", self.from.as_deref()),
            ("to", self.to.as_deref()),
            ("type", self.payment_type.as_deref()),
            ("school", self.school.as_deref()),
            ("course", self.course.as_deref()),
        ];
        pairs
            .iter()
            .filter_map(|(k, v)| v.filter(|v| !v.is_empty()).map(|v| format!("{}={}", k, urlencoding::encode(v))))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn payment_columns() -> Vec<Column<Payment>> {
    vec![
        Column::field("Student ID", "studentId"),
        Column::field("Student Name", "studentName"),
        Column::field("Course", "course"),
        Column::field("School", "school"),
        Column::render("Amount", |p: &Payment| format!("${:.2}", p.amount)),
        Column::render("Payment Type", |p: &Payment| p.payment_type.to_string()),
        Column::field("Date", "date"),
    ]
}

fn payment_fields(current: Option<&Payment>, schools: &[String], courses: &[String]) -> Vec<Field> {
    let text = |f: fn(&Payment) -> String| current.map(f).unwrap_or_default();
    let payment_type = current.map(|p| p.payment_type.to_string());
    vec![
        Field::text("student_id", "Student ID", text(|p| p.student_id.clone())),
        Field::text("student_name", "Student Name", text(|p| p.student_name.clone())),
        Field::select("course", "Course", choices(courses.iter().cloned(), current.map(|p| p.course.as_str()))),
        Field::select("school", "School", choices(schools.iter().cloned(), current.map(|p| p.school.as_str()))),
        Field::input("amount", "Amount", "number", text(|p| p.amount.to_string())),
        Field::select(
            "payment_type",
            "Payment Type",
            choices(PaymentType::ALL.map(|t| t.to_string()), payment_type.as_deref()),
        ),
        Field::input("date", "Date", "date", text(|p| p.date.to_string())),
    ]
}

/// Renders the dashboard page. Page loads query immediately; the debounced
/// path is `/api/payments`.
async fn dashboard_page(
    State(state): State<Arc<AppState>>,
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let filter = params.filter();
    let data = console.dashboard.fetch(&filter);

    let pager = Pager::at(params.page.unwrap_or(1), data.payments.len());
    let table = table::render(&payment_columns(), &data.payments, &pager);

    let editing = match params.edit.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => Repo::<Payment>::new(Arc::clone(&state.data)).find(id).ok().flatten(),
        None => None,
    };

    let mut notices = data.notices.clone();
    notices.extend(notice_from(&params.notice, &params.detail, &params.variant));

    let type_names = PaymentType::ALL.map(|t| t.to_string());
    let context = json!({
        "title": "Dashboard",
        "label": Payment::LABEL,
        "base": "/dashboard",
        "path": "/payments",
        "nav": nav(&console, "/dashboard"),
        "notices": notices,
        "all": ALL,
        "filter": {
            "search": params.search,
            "from": params.from.clone().unwrap_or_default(),
            "to": params.to.clone().unwrap_or_default(),
        },
        "types": choices(type_names, params.payment_type.as_deref()),
        "schools": choices(data.schools.iter().cloned(), params.school.as_deref()),
        "courses": choices(data.courses.iter().cloned(), params.course.as_deref()),
        "query": params.filter_query(),
        "count": data.payments.len(),
        "table": table,
        "form": {
            "id": editing.as_ref().map(|p| p.id.clone()).unwrap_or_default(),
            "editing": editing.is_some(),
            "fields": payment_fields(editing.as_ref(), &data.schools, &data.courses),
        },
    });
    state.serve_template(StatusCode::OK, "dashboard", &context)
}

#[derive(Serialize)]
struct PaymentsPage {
    table: TableView,
    /// The table and pager as the dashboard page renders them.
    html: String,
    count: usize,
    notices: Vec<Notice>,
}

/// Debounced dashboard query for the search box. Answers `204 No Content`
/// when a newer query from the same console superseded this one.
async fn api_payments(
    State(state): State<Arc<AppState>>,
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let Some(data) = console.dashboard.query(params.filter()).await else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let pager = Pager::at(params.page.unwrap_or(1), data.payments.len());
    let table = table::render(&payment_columns(), &data.payments, &pager);
    let context = json!({
        "base": "/dashboard",
        "path": "/payments",
        "query": params.filter_query(),
        "table": &table,
    });
    let html = match state.templates.render("payments_table", &context) {
        Ok(html) => html,
        Err(e) => {
            log::error!("Error rendering payments table: {}", &e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    Json(PaymentsPage {
        table,
        html,
        count: data.payments.len(),
        notices: data.notices,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct PaymentForm {
    #[serde(default)]
    id: String,
    student_id: String,
    student_name: String,
    course: String,
    school: String,
    amount: String,
    payment_type: String,
    date: String,
}

impl PaymentForm {
    fn into_payment(self) -> Result<Payment> {
        let amount = self
            .amount
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Validation("Amount must be a number.".to_owned()))?;
        let date = self
            .date
            .trim()
            .parse::<NaiveDate>()
            .map_err(|_| Error::Validation("Date must be a valid date.".to_owned()))?;

        Ok(Payment {
            id: self.id.trim().to_owned(),
            student_id: self.student_id.trim().to_owned(),
            student_name: self.student_name.trim().to_owned(),
            course: self.course,
            school: self.school,
            amount,
            payment_type: self.payment_type.parse()?,
            date,
        })
    }
}

async fn save_payment(State(state): State<Arc<AppState>>, Form(form): Form<PaymentForm>) -> Redirect {
    let payment = match form.into_payment() {
        Ok(p) => p,
        Err(e) => {
            let notice = Notice::failure("Error saving Payment", e.to_string());
            return redirect_with("/dashboard", Some(&notice));
        }
    };

    let mut view = ListView::new(Repo::<Payment>::new(Arc::clone(&state.data)));
    view.save(payment);
    let notices = view.take_notices();
    redirect_with("/dashboard", notices.first())
}

async fn delete_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(confirm): Form<ConfirmForm>,
) -> Redirect {
    delete_then_redirect::<Payment>(&state.data, &id, &confirm, "/dashboard")
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

fn attachment(content_type: &str, filename: &str, body: impl Into<Body>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", filename);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body.into(),
    )
        .into_response()
}

fn export_failed(e: Error) -> Response {
    log::error!("Export failed: {}", &e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {}", e)).into_response()
}

fn nothing_to_export() -> Response {
    let notice = Notice::success("Nothing to export", "No payments match the current filters.");
    redirect_with("/dashboard", Some(&notice)).into_response()
}

fn filtered_payments(console: &ConsoleSession, params: &DashboardParams) -> Vec<Payment> {
    console.dashboard.fetch(&params.filter()).payments
}

async fn export_report_csv(
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let payments = filtered_payments(&console, &params);
    let rows: Vec<PaymentReportRow> = payments.iter().map(Into::into).collect();
    match export::to_csv(&rows) {
        Ok(Some(csv)) => attachment("text/csv; charset=utf-8", "Payment_Report.csv", csv),
        Ok(None) => nothing_to_export(),
        Err(e) => export_failed(e),
    }
}

async fn export_powerbi_csv(
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let payments = filtered_payments(&console, &params);
    let rows: Vec<PowerBiRow> = payments.iter().map(Into::into).collect();
    match export::to_csv(&rows) {
        Ok(Some(csv)) => attachment("text/csv; charset=utf-8", "Power_BI_Data.csv", csv),
        Ok(None) => nothing_to_export(),
        Err(e) => export_failed(e),
    }
}

async fn export_report_xlsx(
    Extension(console): Extension<Arc<ConsoleSession>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let payments = filtered_payments(&console, &params);
    let rows: Vec<PaymentReportRow> = payments.iter().map(Into::into).collect();
    match export::to_xlsx(&rows, "Payment Report") {
        Ok(Some(bytes)) => attachment(XLSX_MIME, "Payment_Report.xlsx", bytes),
        Ok(None) => nothing_to_export(),
        Err(e) => export_failed(e),
    }
}
