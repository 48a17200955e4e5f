#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use tower::ServiceExt;

use feetrack::app::{AppState, router};
use feetrack::auth::{AuthProvider, LocalAuth};
use feetrack::config::Cfg;
use feetrack::model::School;
use feetrack::repo::Repo;
use feetrack::seed;
use feetrack::store::{DataService, LocalStore};

struct Console {
    app: Router,
    state: Arc<AppState>,
    data: Arc<dyn DataService>,
}

fn console() -> Console {
    console_with(LocalAuth::in_memory())
}

fn console_with(auth: LocalAuth) -> Console {
    let auth: Arc<dyn AuthProvider> = Arc::new(auth);
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    seed::seed(auth.as_ref(), Arc::clone(&data)).unwrap();

    let state = Arc::new(AppState::new(Cfg::default(), Arc::clone(&data), auth).unwrap());
    Console { app: router(Arc::clone(&state)), state, data }
}

impl Console {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::from(form.to_owned())).unwrap()).await
    }

    /// Signs in and returns the `session=<token>` cookie pair.
    async fn login(&self, email: &str) -> String {
        let form = format!("email={}&password=password", email.replace('@', "%40"));
        let res = self.post("/login", None, &form).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/dashboard");
        let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }
}

fn location(res: &Response) -> String {
    res.headers()[header::LOCATION].to_str().unwrap().to_owned()
}

async fn body_text(res: Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn anonymous_requests_go_to_login() {
    let c = console();
    for uri in ["/dashboard", "/schools", "/export/payments.csv"] {
        let res = c.get(uri, None).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&res), "/login");
    }

    let res = c.get("/login", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Sign in"));
}

#[tokio::test]
async fn bad_credentials_show_the_error() {
    let c = console();
    let res = c.post("/login", None, "email=admin%40example.com&password=nope").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(res).await.contains("Invalid login credentials"));
}

#[tokio::test]
async fn dashboard_shows_the_first_page_of_payments() {
    let c = console();
    let cookie = c.login("staff@example.com").await;

    let res = c.get("/dashboard", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("Jack Black"));
    assert!(html.contains("Page 1 of 1"));
    assert!(!html.contains("href=\"/schools\""));
}

#[tokio::test]
async fn staff_cannot_open_admin_pages() {
    let c = console();
    let staff = c.login("staff@example.com").await;
    let res = c.get("/schools", Some(&staff)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/dashboard");

    let admin = c.login("admin@example.com").await;
    let res = c.get("/schools", Some(&admin)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Northwood High"));
}

#[tokio::test]
async fn school_delete_needs_confirmation() {
    let c = console();
    let admin = c.login("admin@example.com").await;
    let schools = Repo::<School>::new(Arc::clone(&c.data));

    let res = c.post("/schools/sch_02/delete", Some(&admin), "").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(schools.fetch_all().unwrap().len(), 3);

    let res = c.post("/schools/sch_02/delete", Some(&admin), "confirm=yes").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert!(location(&res).starts_with("/schools?notice=School%20deleted"));
    assert_eq!(schools.fetch_all().unwrap().len(), 2);
    assert!(schools.find("sch_02").unwrap().is_none());
}

#[tokio::test]
async fn invalid_school_form_redirects_with_a_destructive_notice() {
    let c = console();
    let admin = c.login("admin@example.com").await;

    let res = c.post("/schools", Some(&admin), "id=&name=&city=Gotham").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let to = location(&res);
    assert!(to.contains("variant=destructive"), "{}", to);

    let res = c.get(&to, Some(&admin)).await;
    assert!(body_text(res).await.contains("School name is required."));
}

#[tokio::test]
async fn csv_export_follows_the_filter() {
    let c = console();
    let cookie = c.login("staff@example.com").await;

    let res = c.get("/export/payments.csv?search=eva", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("Payment_Report.csv")
    );
    let csv = body_text(res).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Student ID,Student Name"));
    assert!(lines[1..].iter().all(|l| l.contains("Eva Green")));

    let res = c.get("/export/payments.csv?search=nobody", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert!(location(&res).starts_with("/dashboard?notice=Nothing%20to%20export"));
}

#[tokio::test]
async fn xlsx_export_is_a_workbook() {
    let c = console();
    let cookie = c.login("admin@example.com").await;

    let res = c.get("/export/payments.xlsx", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn payments_api_applies_selectors() {
    let c = console();
    let cookie = c.login("staff@example.com").await;

    let res = c.get("/api/payments?type=Cash", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
    assert_eq!(page["count"], 2);
    assert_eq!(page["table"]["rows"].as_array().unwrap().len(), 2);
    assert_eq!(page["table"]["label"], "Page 1 of 1");
}

#[tokio::test]
async fn payments_api_renders_rows_like_the_page() {
    let c = console();
    let cookie = c.login("staff@example.com").await;

    let res = c.get("/api/payments?search=eva", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
    let html = page["html"].as_str().unwrap();
    assert_eq!(html.matches("/delete\"").count(), 2);
    assert!(html.contains("name=\"confirm\" value=\"yes\""));
    assert!(html.contains("eva&page="), "{}", html);
}

#[tokio::test]
async fn logout_ends_the_console_session() {
    let c = console();
    let cookie = c.login("staff@example.com").await;

    let res = c.post("/logout", Some(&cookie), "").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/login");

    let res = c.get("/dashboard", Some(&cookie)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/login");
}

#[tokio::test]
async fn logging_in_again_replaces_the_old_console() {
    let c = console();
    let first = c.login("staff@example.com").await;
    assert_eq!(c.state.open_consoles(), 1);

    let res = c
        .post("/login", Some(&first), "email=admin%40example.com&password=password")
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(c.state.open_consoles(), 1);

    let res = c.get("/dashboard", Some(&first)).await;
    assert_eq!(location(&res), "/login");
}

#[tokio::test]
async fn expired_consoles_are_dropped_on_next_login() {
    let c = console_with(LocalAuth::in_memory().with_session_ttl(Duration::from_millis(50)));
    for _ in 0..3 {
        c.login("staff@example.com").await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    c.login("admin@example.com").await;
    assert_eq!(c.state.open_consoles(), 1);
}
