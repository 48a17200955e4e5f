/*!
Exports of flat records to CSV and to a styled XLSX workbook.

Records are anything `Serialize` that turns into a JSON object; the header
row is the first record's keys in declaration order.
*/
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::Payment;

/// The payment report as the dashboard offers it, with human headers.
#[derive(Debug, Serialize)]
pub struct PaymentReportRow<'a> {
    #[serde(rename = "Student ID")]
    pub student_id: &'a str,
    #[serde(rename = "Student Name")]
    pub student_name: &'a str,
    #[serde(rename = "Course")]
    pub course: &'a str,
    #[serde(rename = "School")]
    pub school: &'a str,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Payment Type")]
    pub payment_type: &'a str,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
}

impl<'a> From<&'a Payment> for PaymentReportRow<'a> {
    fn from(p: &'a Payment) -> Self {
        PaymentReportRow {
            student_id: &p.student_id,
            student_name: &p.student_name,
            course: &p.course,
            school: &p.school,
            amount: p.amount,
            payment_type: p.payment_type.as_str(),
            date: p.date,
        }
    }
}

/// Same data with machine-friendly keys, for BI tooling.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerBiRow<'a> {
    pub student_id: &'a str,
    pub student_name: &'a str,
    pub course: &'a str,
    pub school: &'a str,
    pub amount: f64,
    pub payment_type: &'a str,
    pub date: NaiveDate,
}

impl<'a> From<&'a Payment> for PowerBiRow<'a> {
    fn from(p: &'a Payment) -> Self {
        PowerBiRow {
            student_id: &p.student_id,
            student_name: &p.student_name,
            course: &p.course,
            school: &p.school,
            amount: p.amount,
            payment_type: p.payment_type.as_str(),
            date: p.date,
        }
    }
}

/// Header plus one row of cell values per record.
struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

fn to_grid<R: Serialize>(records: &[R]) -> Result<Option<Grid>> {
    let mut objects: Vec<Map<String, Value>> = Vec::with_capacity(records.len());
    for r in records {
        match serde_json::to_value(r)? {
            Value::Object(obj) => objects.push(obj),
            other => {
                return Err(Error::Validation(format!(
                    "export needs flat records, got {}",
                    other
                )));
            }
        }
    }

    let Some(first) = objects.first() else {
        return Ok(None);
    };
    let headers: Vec<String> = first.keys().cloned().collect();
    let rows = objects
        .iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok(Some(Grid { headers, rows }))
}

/// Whole-valued floats print without a fraction, like `1200`.
fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// Renders records as CSV text. Empty input exports nothing.
///
/// # Examples
/// ```
/// use feetrack::export::to_csv;
///
/// #[derive(serde::Serialize)]
/// struct Row { name: &'static str, city: &'static str }
///
/// let csv = to_csv(&[Row { name: "Northwood, High", city: "Metropolis" }]).unwrap().unwrap();
/// assert_eq!(csv, "name,city\n\"Northwood, High\",Metropolis\n");
/// ```
pub fn to_csv<R: Serialize>(records: &[R]) -> Result<Option<String>> {
    let Some(grid) = to_grid(records)? else {
        log::warn!("No data to export.");
        return Ok(None);
    };

    let mut csv_content = String::new();
    let header: Vec<String> = grid.headers.iter().map(|h| escape_field(h)).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in &grid.rows {
        let fields: Vec<String> = row.iter().map(|v| escape_field(&cell_text(v))).collect();
        csv_content.push_str(&fields.join(","));
        csv_content.push('\n');
    }

    Ok(Some(csv_content))
}

/// Width of each column in characters: its longest text plus 2.
#[cfg(feature = "web")]
fn column_widths(grid: &Grid) -> Vec<f64> {
    grid.headers
        .iter()
        .enumerate()
        .map(|(c, header)| {
            let longest = grid
                .rows
                .iter()
                .filter_map(|row| row.get(c))
                .map(|v| cell_text(v).chars().count())
                .fold(header.chars().count(), usize::max);
            (longest + 2) as f64
        })
        .collect()
}

/// Renders records as an XLSX workbook with one sheet. Header cells are
/// bold, every cell is bordered and centred, and columns are sized to their
/// longest text.
#[cfg(feature = "web")]
pub fn to_xlsx<R: Serialize>(records: &[R], sheet_name: &str) -> Result<Option<Vec<u8>>> {
    use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

    let Some(grid) = to_grid(records)? else {
        log::warn!("No data to export.");
        return Ok(None);
    };

    let cell_format = Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);
    let header_format = cell_format.clone().set_bold();

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name)?;

    for (c, header) in grid.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, header, &header_format)?;
    }

    for (r, row) in grid.rows.iter().enumerate() {
        let xr = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let xc = c as u16;
            match value {
                Value::Number(n) => {
                    worksheet.write_number_with_format(xr, xc, n.as_f64().unwrap_or(0.0), &cell_format)?;
                }
                Value::Bool(b) => {
                    worksheet.write_boolean_with_format(xr, xc, *b, &cell_format)?;
                }
                other => {
                    worksheet.write_string_with_format(xr, xc, &cell_text(other), &cell_format)?;
                }
            }
        }
    }

    for (c, w) in column_widths(&grid).into_iter().enumerate() {
        worksheet.set_column_width(c as u16, w)?;
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(Some(buffer))
}
