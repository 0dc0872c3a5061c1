use crate::core::portal::PortalService;
use crate::domain::fine::{self, Payment};
use crate::domain::group::View;
use crate::domain::money::format_currency;
use crate::domain::patron::Patron;
use crate::domain::sort::{sort_by, SortField};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FineRow {
    pub key: String,
    pub status: String,
    pub owed: Decimal,
    pub fee: Decimal,
    pub partially_paid: bool,
    pub bill_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub barcode: Option<String>,
    pub borrower: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FineStatement {
    pub view: View,
    pub fines: Vec<FineRow>,
    pub payments: Vec<Payment>,
    pub total_owed: Decimal,
    pub total_owed_label: String,
    pub can_pay: bool,
}

pub fn statement(patron: &Patron, view: View) -> FineStatement {
    let mut fines = patron.visible_fines(view);
    sort_by(&mut fines, SortField::Date);
    let total_owed = fine::total_owed_refs(&fines);

    let mut payments: Vec<Payment> = patron.visible_payments(view).into_iter().cloned().collect();
    sort_by(&mut payments, SortField::Date);

    FineStatement {
        view,
        fines: fines
            .into_iter()
            .map(|f| FineRow {
                key: f.key.clone(),
                status: f.nice_status(),
                owed: f.owed,
                fee: f.fee,
                partially_paid: f.partially_paid(),
                bill_date: f.bill_date,
                title: f.title.clone(),
                barcode: f.barcode.clone(),
                borrower: match view {
                    View::Group => patron
                        .group
                        .as_ref()
                        .and_then(|g| g.member_name(&f.patron_key))
                        .map(str::to_string),
                    View::Own => None,
                },
            })
            .collect(),
        payments,
        total_owed,
        total_owed_label: format_currency(total_owed),
        can_pay: patron.can_pay(view),
    }
}

pub async fn list(service: &PortalService, patron_key: &str, view: View) -> Result<FineStatement> {
    let patron = service.patron(patron_key).await?;
    Ok(statement(&patron, view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fine::Fine;
    use crate::domain::group::Group;

    fn fine(key: &str, patron: &str, cents: i64) -> Fine {
        let mut f = Fine::new(key, "OVERDUE", Decimal::new(cents, 2));
        f.patron_key = patron.to_string();
        f
    }

    #[test]
    fn test_statement_totals() {
        let mut patron = Patron::new("p1", "Pat", "Ron");
        patron.fines = vec![fine("f1", "p1", 1050), fine("f2", "p1", 225)];

        let statement = statement(&patron, View::Own);
        assert_eq!(statement.total_owed, Decimal::new(1275, 2));
        assert_eq!(statement.total_owed_label, "$12.75");
        assert!(statement.can_pay);
        assert_eq!(statement.fines[0].status, "Overdue item");
    }

    #[test]
    fn test_proxy_sees_no_fines() {
        let mut patron = Patron::new("proxy-1", "Prox", "Y");
        patron.proxy = true;
        patron.fines = vec![fine("f1", "proxy-1", 500)];
        patron.group = Some(Group {
            sponsor_key: Some("sponsor".to_string()),
            fines: vec![fine("g1", "proxy-2", 800)],
            ..Group::default()
        });

        for view in [View::Own, View::Group] {
            let statement = statement(&patron, view);
            assert!(statement.fines.is_empty());
            assert_eq!(statement.total_owed, Decimal::ZERO);
            assert!(!statement.can_pay);
        }
    }
}
