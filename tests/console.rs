mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{FlakyStore, StubbornAuth};
use feetrack::auth::{AuthProvider, LocalAuth};
use feetrack::model::{Course, Role, School, User};
use feetrack::repo::Repo;
use feetrack::session::AuthState;
use feetrack::store::{DataService, LocalStore};
use feetrack::users::{UserAdmin, UserForm};
use feetrack::view::{ListView, Variant};

fn school(id: &str, name: &str, city: &str) -> School {
    School { id: id.into(), name: name.into(), city: city.into() }
}

fn course(id: &str, name: &str, code: &str) -> Course {
    Course { id: id.into(), name: name.into(), code: code.into() }
}

fn form(name: &str, email: &str, role: Role, password: Option<&str>) -> UserForm {
    UserForm {
        id: None,
        name: name.into(),
        email: email.into(),
        role,
        password: password.map(str::to_owned),
    }
}

#[test]
fn list_view_is_loading_until_first_fetch() {
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let mut view = ListView::new(Repo::<School>::new(data));
    assert!(view.is_loading());
    assert!(view.load().is_empty());
    assert!(!view.is_loading());
}

#[test]
fn saving_a_course_inserts_then_updates() {
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let mut view = ListView::new(Repo::<Course>::new(Arc::clone(&data)));

    assert!(view.save(course("", "Quantum Physics", "PHY404")));
    assert_eq!(view.rows().len(), 1);
    let id = view.rows()[0].id.clone();
    assert!(id.starts_with("crs_"));
    assert_eq!(view.take_notices()[0].description, "Course created successfully.");

    assert!(view.save(course(&id, "Quantum Physics II", "PHY405")));
    assert_eq!(view.rows().len(), 1);
    assert_eq!(view.rows()[0], course(&id, "Quantum Physics II", "PHY405"));
    assert_eq!(view.take_notices()[0].description, "Course updated successfully.");
}

#[test]
fn invalid_records_are_reported_not_written() {
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let mut view = ListView::new(Repo::<School>::new(data));

    assert!(!view.save(school("", "  ", "")));
    let notices = view.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].variant, Variant::Destructive);
    assert_eq!(notices[0].description, "School name is required., City is required.");
    assert!(view.load().is_empty());
}

#[test]
fn deleting_a_school_needs_confirmation_and_removes_one_row() {
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let repo = Repo::<School>::new(Arc::clone(&data));
    repo.insert(vec![
        school("sch_01", "Northwood High", "Metropolis"),
        school("sch_02", "Southside Secondary", "Gotham"),
        school("sch_03", "West Valley College", "Star City"),
    ])
    .unwrap();

    let mut view = ListView::new(repo);
    assert_eq!(view.load().len(), 3);

    assert!(!view.delete("sch_02", false));
    assert_eq!(view.rows().len(), 3);
    assert!(view.notices().is_empty());

    assert!(view.delete("sch_02", true));
    let names: Vec<&str> = view.rows().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Northwood High", "West Valley College"]);
}

#[test]
fn failed_fetch_keeps_rows_and_notifies() {
    let store = FlakyStore::new();
    let data: Arc<dyn DataService> = store.clone();
    Repo::<School>::new(Arc::clone(&data))
        .insert(vec![school("sch_01", "Northwood High", "Metropolis")])
        .unwrap();

    let mut view = ListView::new(Repo::<School>::new(data));
    assert_eq!(view.load().len(), 1);

    store.fail_select.store(true, Ordering::SeqCst);
    assert_eq!(view.load().len(), 1);
    let notices = view.take_notices();
    assert_eq!(notices[0].title, "Error fetching schools");
    assert_eq!(notices[0].variant, Variant::Destructive);
    assert!(notices[0].description.contains("connection reset"));
}

#[test]
fn wrong_password_does_not_authenticate() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    auth.create_user("admin@example.com", "password", "Admin User").unwrap();

    let state = AuthState::new(auth, data);
    assert!(!state.authenticate("admin@example.com", "wrong"));
    assert!(state.user().is_none());
    assert!(state.role().is_none());
    assert!(!state.is_loading());
}

#[test]
fn missing_profile_means_staff_named_after_email() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    auth.create_user("ghost@example.com", "secret1", "Ghost").unwrap();

    let state = AuthState::new(auth, data);
    assert!(state.authenticate("ghost@example.com", "secret1"));
    let user = state.user().unwrap();
    assert_eq!(user.role, Role::Staff);
    assert_eq!(user.name, "ghost@example.com");
}

#[test]
fn sign_out_elsewhere_clears_the_state() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth.clone(), Arc::clone(&data));
    admin
        .add_user(&form("Staff User", "staff@example.com", Role::Staff, Some("password")))
        .unwrap();

    let state = AuthState::new(auth.clone(), data);
    assert!(state.authenticate("staff@example.com", "password"));
    assert_eq!(state.role(), Some(Role::Staff));

    auth.sign_out(&state.token().unwrap()).unwrap();
    state.sync();
    assert!(state.user().is_none());
}

#[test]
fn role_changes_apply_after_sync() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth.clone(), Arc::clone(&data));
    let user = admin
        .add_user(&form("Staff User", "staff@example.com", Role::Staff, Some("password")))
        .unwrap();

    let state = AuthState::new(auth, data);
    assert!(state.authenticate("staff@example.com", "password"));

    let mut promote = form("Staff Lead", "staff@example.com", Role::Admin, None);
    promote.id = Some(user.id.clone());
    admin.update_user(&promote).unwrap();

    state.sync();
    let current = state.user().unwrap();
    assert_eq!(current.role, Role::Admin);
    assert_eq!(current.name, "Staff Lead");

    admin.delete_user(&user.id).unwrap();
    state.sync();
    assert!(state.user().is_none());
}

#[test]
fn adding_a_user_creates_credentials_and_profile() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth.clone(), data);

    let user = admin
        .save(&form("Alice Johnson", "alice@example.com", Role::Admin, Some("hunter22")))
        .unwrap();
    assert_eq!(admin.list().unwrap(), vec![user.clone()]);

    let session = auth.sign_in("alice@example.com", "hunter22").unwrap();
    assert_eq!(session.user_id, user.id);
}

#[test]
fn new_users_need_a_valid_password() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth, data);

    let err = admin.add_user(&form("Bob", "bob@example.com", Role::Staff, None)).unwrap_err();
    assert_eq!(err.to_string(), "Password is required for new users.");

    let err = admin
        .add_user(&form("", "not-an-email", Role::Staff, Some("abc")))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Name is required., Invalid email address., Password must be at least 6 characters."
    );
}

#[test]
fn failed_profile_insert_removes_the_auth_user() {
    let auth = Arc::new(LocalAuth::in_memory());
    let store = FlakyStore::new();
    let admin = UserAdmin::new(auth.clone(), store.clone());

    store.fail_insert.store(true, Ordering::SeqCst);
    let err = admin
        .add_user(&form("Charlie Brown", "charlie@example.com", Role::Staff, Some("password")))
        .unwrap_err();
    assert!(err.to_string().contains("Failed to create user profile:"), "{}", err);
    assert!(auth.sign_in("charlie@example.com", "password").is_err());

    store.fail_insert.store(false, Ordering::SeqCst);
    assert!(
        admin
            .add_user(&form("Charlie Brown", "charlie@example.com", Role::Staff, Some("password")))
            .is_ok()
    );
}

#[test]
fn inserts_that_return_no_row_are_errors() {
    let auth = Arc::new(LocalAuth::in_memory());
    let store = FlakyStore::new();
    store.swallow_insert.store(true, Ordering::SeqCst);

    let err = Repo::<School>::new(store.clone())
        .save(school("", "Northwood High", "Metropolis"))
        .unwrap_err();
    assert!(err.to_string().contains("returned no row"), "{}", err);

    let admin = UserAdmin::new(auth.clone(), store.clone());
    let err = admin
        .add_user(&form("Charlie Brown", "charlie@example.com", Role::Staff, Some("password")))
        .unwrap_err();
    assert!(err.to_string().contains("Failed to create user profile:"), "{}", err);
    assert!(auth.sign_in("charlie@example.com", "password").is_err());
}

#[test]
fn failed_auth_delete_reports_partial_failure() {
    let auth = StubbornAuth::new();
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth.clone(), Arc::clone(&data));
    let user = admin
        .add_user(&form("Diana Prince", "diana@example.com", Role::Staff, Some("password")))
        .unwrap();

    auth.fail_delete.store(true, Ordering::SeqCst);
    let err = admin.delete_user(&user.id).unwrap_err();
    assert!(
        err.to_string().starts_with("Profile deleted, but failed to delete auth user:"),
        "{}",
        err
    );

    assert!(Repo::<User>::new(data).find(&user.id).unwrap().is_none());
    assert!(auth.sign_in("diana@example.com", "password").is_ok());
}

#[test]
fn updating_requires_an_id() {
    let auth = Arc::new(LocalAuth::in_memory());
    let data: Arc<dyn DataService> = Arc::new(LocalStore::in_memory());
    let admin = UserAdmin::new(auth, data);

    let err = admin
        .update_user(&form("Eve", "eve@example.com", Role::Staff, None))
        .unwrap_err();
    assert_eq!(err.to_string(), "User ID is missing.");
}
