use crate::domain::money;
use crate::domain::sort::{date_component, join_key, SortField, Sortable};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// An open charge on the patron's account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fine {
    pub key: String,
    pub patron_key: String,
    /// ILS reason code (Symphony block key, FOLIO fee/fine type).
    pub reason: String,
    pub owed: Decimal,
    /// Original amount billed.
    pub fee: Decimal,
    pub bill_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub barcode: Option<String>,
    pub library: Option<String>,
    /// FOLIO loan the charge came from; used to attribute proxy fines.
    pub loan_key: Option<String>,
}

impl Fine {
    pub fn new(key: impl Into<String>, reason: impl Into<String>, owed: Decimal) -> Self {
        Self {
            key: key.into(),
            patron_key: String::new(),
            reason: reason.into(),
            owed,
            fee: owed,
            bill_date: None,
            title: None,
            author: None,
            barcode: None,
            library: None,
            loan_key: None,
        }
    }

    pub fn nice_status(&self) -> String {
        let label = match self.reason.to_ascii_uppercase().as_str() {
            "OVERDUE" | "OVERDUE FINE" => "Overdue item",
            "RECALLOVD" | "RECALL OVERDUE" => "Overdue recall",
            "LOST" | "LOST ITEM FEE" => "Lost item",
            "LOST ITEM PROCESSING FEE" | "PROCESSING" | "PROCESSFEE" => "Processing fee",
            "DAMAGED" | "DAMAGE" => "Damaged item",
            "CLAIMSRET" => "Claimed returned",
            "REPLACEMENT PROCESSING FEE" => "Replacement processing fee",
            "BADADDRESS" => "Bad address",
            "LIBR_CARD" | "LIBRARY CARD" => "Library card fee",
            _ => return self.reason.clone(),
        };
        label.to_string()
    }

    pub fn partially_paid(&self) -> bool {
        self.owed < self.fee
    }
}

impl Sortable for Fine {
    fn sort_key(&self, field: SortField) -> String {
        let bill = date_component(self.bill_date);
        let title = self.title.as_deref().unwrap_or("");
        match field {
            SortField::Title => join_key(&[title, &bill]),
            SortField::Status => join_key(&[&self.nice_status(), &bill, title]),
            _ => join_key(&[&bill, title]),
        }
    }
}

/// A closed charge: paid, waived, transferred or cancelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub key: String,
    pub patron_key: String,
    pub description: String,
    pub amount: Decimal,
    pub bill_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub resolution: String,
    pub title: Option<String>,
}

impl Sortable for Payment {
    /// Newest payment first: the date component is inverted.
    fn sort_key(&self, field: SortField) -> String {
        let paid = self
            .payment_date
            .map(|d| format!("{:012}", 999_999_999_999i64 - d.timestamp().max(0)))
            .unwrap_or_else(|| "999999999999".to_string());
        let title = self.title.as_deref().unwrap_or("");
        match field {
            SortField::Title => join_key(&[title, &paid]),
            _ => join_key(&[&paid, &self.description]),
        }
    }
}

pub fn total_owed(fines: &[Fine]) -> Decimal {
    money::total(fines.iter().map(|f| &f.owed))
}

pub fn total_owed_refs(fines: &[&Fine]) -> Decimal {
    money::total(fines.iter().map(|f| &f.owed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sort::sort_by;
    use chrono::TimeZone;

    #[test]
    fn test_total_owed_is_exact() {
        let fines = vec![
            Fine::new("1", "OVERDUE", Decimal::new(10, 2)),
            Fine::new("2", "OVERDUE", Decimal::new(20, 2)),
            Fine::new("3", "LOST", Decimal::new(4500, 2)),
        ];
        assert_eq!(total_owed(&fines), Decimal::new(4530, 2));
        assert_eq!(total_owed(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_nice_status() {
        assert_eq!(Fine::new("1", "OVERDUE", Decimal::ONE).nice_status(), "Overdue item");
        assert_eq!(Fine::new("1", "Lost item fee", Decimal::ONE).nice_status(), "Lost item");
        assert_eq!(Fine::new("1", "Custom", Decimal::ONE).nice_status(), "Custom");
    }

    #[test]
    fn test_partially_paid() {
        let mut fine = Fine::new("1", "LOST", Decimal::new(30, 0));
        assert!(!fine.partially_paid());
        fine.fee = Decimal::new(50, 0);
        assert!(fine.partially_paid());
    }

    #[test]
    fn test_payments_sort_newest_first() {
        let payment = |key: &str, day: u32| Payment {
            key: key.to_string(),
            patron_key: "p".to_string(),
            description: "Overdue".to_string(),
            amount: Decimal::ONE,
            bill_date: None,
            payment_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()),
            method: None,
            resolution: "Paid fully".to_string(),
            title: None,
        };
        let mut payments = vec![payment("old", 1), payment("new", 20)];
        sort_by(&mut payments, SortField::Date);
        assert_eq!(payments[0].key, "new");
    }
}
