/*!
Record types for the four console tables.

Every record is flat and carries a string identifier. An empty `id` means the
record has not been stored yet; saving it will synthesize one.
*/
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Order;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// The tables the data service knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Users,
    Schools,
    Courses,
    Payments,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Users, Table::Schools, Table::Courses, Table::Payments];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Schools => "schools",
            Table::Courses => "courses",
            Table::Payments => "payments",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[default]
    Staff,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin => "Admin",
            Role::Staff => "Staff",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Staff" => Ok(Role::Staff),
            _ => Err(Error::Validation(format!("{:?} is not a valid role.", s))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    #[serde(rename = "Credit Card")]
    CreditCard,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cash,
}

impl PaymentType {
    pub const ALL: [PaymentType; 3] = [
        PaymentType::CreditCard,
        PaymentType::BankTransfer,
        PaymentType::Cash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::CreditCard => "Credit Card",
            PaymentType::BankTransfer => "Bank Transfer",
            PaymentType::Cash => "Cash",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PaymentType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Validation(format!("{:?} is not a valid payment type.", s)))
    }
}

/// Typed access to one table.
///
/// Implementors name their table, the prefix used for synthesized ids, the
/// field list views are ordered by, and the checks a row must pass before it
/// is written.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;
    const ID_PREFIX: &'static str;
    /// Singular, capitalised, for notices ("School saved").
    const LABEL: &'static str;
    const ORDER: Order;

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn validate(&self) -> Result<()>;
}

/// Generates `<prefix>_<uuid>` for records saved without an identifier.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

fn stored_id(id: &str) -> Option<&str> {
    if id.is_empty() { None } else { Some(id) }
}

fn require(value: &str, message: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(message.to_owned());
    }
}

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors))
    }
}

pub fn is_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

/// Profile row mirrored from the auth service, keyed by the auth user id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl Record for User {
    const TABLE: Table = Table::Users;
    const ID_PREFIX: &'static str = "usr";
    const LABEL: &'static str = "User";
    const ORDER: Order = Order::asc("name");

    fn id(&self) -> Option<&str> {
        stored_id(&self.id)
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.name, "Name is required.", &mut errors);
        if !is_email(&self.email) {
            errors.push("Invalid email address.".to_owned());
        }
        finish(errors)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct School {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub city: String,
}

impl Record for School {
    const TABLE: Table = Table::Schools;
    const ID_PREFIX: &'static str = "sch";
    const LABEL: &'static str = "School";
    const ORDER: Order = Order::asc("name");

    fn id(&self) -> Option<&str> {
        stored_id(&self.id)
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.name, "School name is required.", &mut errors);
        require(&self.city, "City is required.", &mut errors);
        finish(errors)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub code: String,
}

impl Record for Course {
    const TABLE: Table = Table::Courses;
    const ID_PREFIX: &'static str = "crs";
    const LABEL: &'static str = "Course";
    const ORDER: Order = Order::asc("name");

    fn id(&self) -> Option<&str> {
        stored_id(&self.id)
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.name, "Course name is required.", &mut errors);
        require(&self.code, "Course code is required.", &mut errors);
        finish(errors)
    }
}

/// A fee payment. `course` and `school` hold the names current at the time
/// the payment was recorded, not references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub school: String,
    pub amount: f64,
    pub payment_type: PaymentType,
    #[serde(deserialize_with = "date_or_timestamp")]
    pub date: NaiveDate,
}

impl Record for Payment {
    const TABLE: Table = Table::Payments;
    const ID_PREFIX: &'static str = "pay";
    const LABEL: &'static str = "Payment";
    const ORDER: Order = Order::desc("date");

    fn id(&self) -> Option<&str> {
        stored_id(&self.id)
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.student_id, "Student ID is required.", &mut errors);
        require(&self.student_name, "Student name is required.", &mut errors);
        require(&self.course, "Course is required.", &mut errors);
        require(&self.school, "School is required.", &mut errors);
        if !self.amount.is_finite() || self.amount < 0.0 {
            errors.push("Amount must be a non-negative number.".to_owned());
        }
        finish(errors)
    }
}

/// Accepts both `2024-02-10` and full timestamps such as
/// `2024-02-10T00:00:00.000Z`, keeping only the calendar date.
fn date_or_timestamp<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let day = s.get(..10).unwrap_or(&s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}
