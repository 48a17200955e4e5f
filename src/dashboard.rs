/*!
The payments dashboard: filtering, filter options, and the query path that
debounces search input and drops superseded results.
*/
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{Course, Payment, PaymentType, School};
use crate::repo::Repo;
use crate::store::DataService;
use crate::view::Notice;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Selector value meaning "no restriction".
pub const ALL: &str = "all";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaymentFilter {
    pub search: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub payment_type: Option<PaymentType>,
    pub school: Option<String>,
    pub course: Option<String>,
}

/// Treats empty strings and "all" as unset.
pub fn selector(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != ALL)
        .map(str::to_owned)
}

impl PaymentFilter {
    pub fn matches(&self, p: &Payment) -> bool {
        let needle = self.search.trim().to_lowercase();
        let matches_search = needle.is_empty()
            || p.student_name.to_lowercase().contains(&needle)
            || p.student_id.to_lowercase().contains(&needle);

        let matches_date = match (self.from, self.to) {
            (Some(from), Some(to)) => p.date >= from && p.date <= to,
            _ => true,
        };

        let matches_type = self.payment_type.is_none_or(|t| p.payment_type == t);
        let matches_school = self.school.as_deref().is_none_or(|s| p.school == s);
        let matches_course = self.course.as_deref().is_none_or(|c| p.course == c);

        matches_search && matches_date && matches_type && matches_school && matches_course
    }

    pub fn apply(&self, payments: &[Payment]) -> Vec<Payment> {
        payments.iter().filter(|p| self.matches(p)).cloned().collect()
    }
}

/// Issues tickets in increasing order; only the most recent one is current.
#[derive(Debug, Default)]
pub struct FetchGate {
    latest: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u64);

impl FetchGate {
    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DashboardData {
    pub payments: Vec<Payment>,
    pub schools: Vec<String>,
    pub courses: Vec<String>,
    pub notices: Vec<Notice>,
}

pub struct Dashboard {
    payments: Repo<Payment>,
    schools: Repo<School>,
    courses: Repo<Course>,
    gate: FetchGate,
    debounce: Duration,
    applied: Mutex<PaymentFilter>,
    /// Every payment from the last successful fetch, unfiltered, so a failed
    /// fetch can still show the current filter over known rows.
    last_rows: Mutex<Vec<Payment>>,
}

impl Dashboard {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Dashboard {
            payments: Repo::new(Arc::clone(&data)),
            schools: Repo::new(Arc::clone(&data)),
            courses: Repo::new(data),
            gate: FetchGate::default(),
            debounce: SEARCH_DEBOUNCE,
            applied: Mutex::new(PaymentFilter::default()),
            last_rows: Mutex::new(Vec::new()),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Runs a dashboard query. A changed search term waits out the debounce
    /// interval first; selector-only changes run at once. Returns `None` when
    /// a newer query started before this one finished.
    pub async fn query(&self, filter: PaymentFilter) -> Option<DashboardData> {
        let ticket = self.gate.begin();

        let search_changed = {
            let applied = self.applied.lock().unwrap_or_else(|e| e.into_inner());
            applied.search != filter.search
        };
        if search_changed {
            tokio::time::sleep(self.debounce).await;
            if !self.gate.is_current(ticket) {
                log::trace!("Search {:?} superseded while debouncing", &filter.search);
                return None;
            }
        }

        let data = self.fetch(&filter);
        if !self.gate.is_current(ticket) {
            log::trace!("Dropping superseded dashboard result");
            return None;
        }

        *self.applied.lock().unwrap_or_else(|e| e.into_inner()) = filter;
        Some(data)
    }

    /// Fetches payments and the filter option lists immediately. Each failed
    /// fetch becomes a notice; the others still fill in.
    pub fn fetch(&self, filter: &PaymentFilter) -> DashboardData {
        let mut data = DashboardData::default();

        match self.payments.fetch_all() {
            Ok(rows) => {
                data.payments = filter.apply(&rows);
                *self.last_rows.lock().unwrap_or_else(|e| e.into_inner()) = rows;
            }
            Err(e) => {
                log::warn!("Fetching payments failed: {}", &e);
                data.notices.push(Notice::failure("Error fetching payments", e.to_string()));
                let last = self.last_rows.lock().unwrap_or_else(|e| e.into_inner());
                data.payments = filter.apply(&last);
            }
        }

        match self.schools.fetch_all() {
            Ok(rows) => data.schools = distinct(rows.into_iter().map(|s| s.name)),
            Err(e) => {
                log::warn!("Fetching schools failed: {}", &e);
                data.notices.push(Notice::failure("Error fetching schools", e.to_string()));
            }
        }

        match self.courses.fetch_all() {
            Ok(rows) => data.courses = distinct(rows.into_iter().map(|c| c.name)),
            Err(e) => {
                log::warn!("Fetching courses failed: {}", &e);
                data.notices.push(Notice::failure("Error fetching courses", e.to_string()));
            }
        }

        data
    }
}

fn distinct(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, student_id: &str, name: &str, school: &str, t: PaymentType, date: &str) -> Payment {
        Payment {
            id: id.into(),
            student_id: student_id.into(),
            student_name: name.into(),
            course: "Computer Science 101".into(),
            school: school.into(),
            amount: 100.0,
            payment_type: t,
            date: date.parse().unwrap(),
        }
    }

    fn sample() -> Vec<Payment> {
        vec![
            p("1", "stu_001", "Eva Green", "Northwood High", PaymentType::CreditCard, "2023-08-15"),
            p("2", "stu_002", "Frank Miller", "Southside Secondary", PaymentType::BankTransfer, "2023-09-01"),
            p("3", "stu_eva9", "Grace Hopper", "West Valley College", PaymentType::Cash, "2023-09-05"),
            p("4", "stu_001", "Eva Green", "Northwood High", PaymentType::BankTransfer, "2024-02-10"),
        ]
    }

    #[test]
    fn search_matches_name_or_id_case_insensitively() {
        let filter = PaymentFilter { search: "Eva".into(), ..Default::default() };
        let ids: Vec<String> = filter.apply(&sample()).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["1", "3", "4"]);
    }

    #[test]
    fn date_range_needs_both_ends() {
        let only_from = PaymentFilter {
            from: Some("2024-01-01".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(only_from.apply(&sample()).len(), 4);

        let range = PaymentFilter {
            from: Some("2023-09-01".parse().unwrap()),
            to: Some("2023-09-05".parse().unwrap()),
            ..Default::default()
        };
        let ids: Vec<String> = range.apply(&sample()).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["2", "3"]);
    }

    #[test]
    fn selectors_combine() {
        let filter = PaymentFilter {
            payment_type: Some(PaymentType::BankTransfer),
            school: selector(Some("Northwood High")),
            course: selector(Some(ALL)),
            ..Default::default()
        };
        let ids: Vec<String> = filter.apply(&sample()).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["4"]);
    }

    #[test]
    fn only_the_latest_ticket_is_current() {
        let gate = FetchGate::default();
        let a = gate.begin();
        assert!(gate.is_current(a));
        let b = gate.begin();
        assert!(!gate.is_current(a));
        assert!(gate.is_current(b));
    }
}
