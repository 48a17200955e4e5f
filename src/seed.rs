/*!
Demo data for a fresh data directory.
*/
use std::sync::Arc;

use chrono::NaiveDate;

use crate::auth::AuthProvider;
use crate::error::Result;
use crate::model::{Course, Payment, PaymentType, Role, School, User};
use crate::repo::Repo;
use crate::store::DataService;

const PAYMENT_CHUNK: usize = 100;
const DEMO_PASSWORD: &str = "password";

pub struct SeedUser {
    pub name: &'static str,
    pub email: &'static str,
    pub role: Role,
    pub password: &'static str,
}

pub fn users() -> Vec<SeedUser> {
    vec![
        SeedUser { name: "Admin User", email: "admin@example.com", role: Role::Admin, password: DEMO_PASSWORD },
        SeedUser { name: "Staff User", email: "staff@example.com", role: Role::Staff, password: DEMO_PASSWORD },
        SeedUser { name: "Alice Johnson", email: "alice@example.com", role: Role::Staff, password: DEMO_PASSWORD },
        SeedUser { name: "Bob Williams", email: "bob@example.com", role: Role::Staff, password: DEMO_PASSWORD },
        SeedUser { name: "Charlie Brown", email: "charlie@example.com", role: Role::Staff, password: DEMO_PASSWORD },
        SeedUser { name: "Diana Prince", email: "diana@example.com", role: Role::Staff, password: DEMO_PASSWORD },
    ]
}

pub fn schools() -> Vec<School> {
    [
        ("sch_01", "Northwood High", "Metropolis"),
        ("sch_02", "Southside Secondary", "Gotham"),
        ("sch_03", "West Valley College", "Star City"),
    ]
    .into_iter()
    .map(|(id, name, city)| School { id: id.into(), name: name.into(), city: city.into() })
    .collect()
}

pub fn courses() -> Vec<Course> {
    [
        ("crs_101", "Computer Science 101", "CS101"),
        ("crs_102", "Advanced Mathematics", "MATH202"),
        ("crs_103", "History of Art", "ART301"),
        ("crs_104", "Quantum Physics", "PHY404"),
    ]
    .into_iter()
    .map(|(id, name, code)| Course { id: id.into(), name: name.into(), code: code.into() })
    .collect()
}

pub fn payments() -> Vec<Payment> {
    use PaymentType::*;

    [
        ("pay_001", "stu_001", "Eva Green", "Computer Science 101", "Northwood High", 1200.0, CreditCard, (2023, 8, 15)),
        ("pay_002", "stu_002", "Frank Miller", "Advanced Mathematics", "Southside Secondary", 950.0, BankTransfer, (2023, 9, 1)),
        ("pay_003", "stu_003", "Grace Hopper", "History of Art", "West Valley College", 750.0, Cash, (2023, 9, 5)),
        ("pay_004", "stu_004", "Henry Ford", "Quantum Physics", "Northwood High", 1500.0, CreditCard, (2024, 1, 20)),
        ("pay_005", "stu_001", "Eva Green", "Advanced Mathematics", "Northwood High", 1200.0, BankTransfer, (2024, 2, 10)),
        ("pay_006", "stu_005", "Ivy Queen", "Computer Science 101", "Southside Secondary", 1100.0, Cash, (2024, 3, 12)),
        ("pay_007", "stu_002", "Frank Miller", "History of Art", "Southside Secondary", 800.0, CreditCard, (2024, 4, 18)),
        ("pay_008", "stu_006", "Jack Black", "Quantum Physics", "West Valley College", 1600.0, BankTransfer, (2024, 5, 21)),
    ]
    .into_iter()
    .filter_map(|(id, sid, name, course, school, amount, payment_type, (y, m, d))| {
        Some(Payment {
            id: id.into(),
            student_id: sid.into(),
            student_name: name.into(),
            course: course.into(),
            school: school.into(),
            amount,
            payment_type,
            date: NaiveDate::from_ymd_opt(y, m, d)?,
        })
    })
    .collect()
}

/// Counts of what a seeding run wrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub schools: usize,
    pub courses: usize,
    pub payments: usize,
}

/// Seeds users (auth record plus profile), schools, courses, and payments.
///
/// A user whose auth record or profile can't be created is logged and
/// skipped, as is a failed school or course insert. Payments go in chunks of
/// 100; a failed chunk is logged and the rest still go in.
pub fn seed(auth: &dyn AuthProvider, data: Arc<dyn DataService>) -> Result<SeedReport> {
    let profiles: Repo<User> = Repo::new(Arc::clone(&data));
    let school_repo: Repo<School> = Repo::new(Arc::clone(&data));
    let course_repo: Repo<Course> = Repo::new(Arc::clone(&data));
    let payment_repo: Repo<Payment> = Repo::new(data);
    let mut report = SeedReport::default();

    log::info!("Seeding users...");
    for u in users() {
        let id = match auth.create_user(u.email, u.password, u.name) {
            Ok(created) => {
                log::info!("Auth user {} created successfully.", u.email);
                created.id
            }
            Err(e) => {
                log::error!("Error creating auth user {}: {}", u.email, &e);
                continue;
            }
        };

        let profile = User { id, name: u.name.into(), email: u.email.into(), role: u.role };
        match profiles.insert(vec![profile]) {
            Ok(_) => report.users += 1,
            Err(e) => log::error!("Error creating profile for {}: {}", u.email, &e),
        }
    }

    log::info!("Seeding schools...");
    match school_repo.insert(schools()) {
        Ok(rows) => report.schools = rows.len(),
        Err(e) => log::error!("Error seeding schools: {}", &e),
    }

    log::info!("Seeding courses...");
    match course_repo.insert(courses()) {
        Ok(rows) => report.courses = rows.len(),
        Err(e) => log::error!("Error seeding courses: {}", &e),
    }

    log::info!("Seeding payments...");
    let all = payments();
    for (i, chunk) in all.chunks(PAYMENT_CHUNK).enumerate() {
        match payment_repo.insert(chunk.to_vec()) {
            Ok(rows) => report.payments += rows.len(),
            Err(e) => log::error!("Error seeding payments chunk {}: {}", i + 1, &e),
        }
    }

    log::info!("Data seeding complete.");
    Ok(report)
}
