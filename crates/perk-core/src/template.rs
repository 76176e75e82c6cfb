//! # Message Templates
//!
//! `{variable}` substitution for campaign SMS and email bodies.
//!
//! ```text
//! "Hi {first_name}, use {coupon_code} at {booking_url}"
//!        │                 │                │
//!        ▼                 ▼                ▼
//! "Hi Dana, use K7QPM2XA at https://book.example.com/?c=cust-1&coupon=K7QPM2XA"
//! ```
//!
//! Unknown placeholders are left untouched so a typo shows up in the sent
//! message instead of silently disappearing.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::money::Money;
use crate::types::Customer;

/// Business details every message may reference.
#[derive(Debug, Clone, Default)]
pub struct BusinessInfo {
    pub name: String,
    pub phone: String,
    pub booking_url: String,
    /// Cents of value per loyalty point, for `{loyalty_value}`.
    pub loyalty_cents_per_point: i64,
}

/// Variable name → rendered value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The standard per-recipient variable set.
    pub fn for_recipient(
        customer: &Customer,
        coupon_code: Option<&str>,
        business: &BusinessInfo,
        now: DateTime<Utc>,
    ) -> Self {
        let mut vars = Self::new();
        vars.insert("first_name", customer.first_name.clone());
        vars.insert("last_name", customer.last_name.clone().unwrap_or_default());
        vars.insert("name", customer.full_name());
        vars.insert("coupon_code", coupon_code.unwrap_or_default());
        vars.insert("business_name", business.name.clone());
        vars.insert("business_phone", business.phone.clone());
        vars.insert(
            "booking_url",
            personalised_booking_url(&business.booking_url, &customer.id, coupon_code),
        );
        vars.insert("loyalty_points", customer.loyalty_points_balance.to_string());
        vars.insert(
            "loyalty_value",
            Money::from_cents(customer.loyalty_points_balance * business.loyalty_cents_per_point)
                .to_string(),
        );
        vars.insert("visit_count", customer.visit_count.to_string());
        vars.insert(
            "days_since_last_visit",
            customer
                .days_since_last_visit(now)
                .map(|d| d.to_string())
                .unwrap_or_default(),
        );
        vars.insert("lifetime_spend", customer.lifetime_spend().to_string());
        vars
    }
}

/// Booking link carrying the customer id and, if any, the coupon code.
pub fn personalised_booking_url(base: &str, customer_id: &str, coupon_code: Option<&str>) -> String {
    if base.is_empty() {
        return String::new();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    match coupon_code {
        Some(code) if !code.is_empty() => format!("{}{}c={}&coupon={}", base, sep, customer_id, code),
        _ => format!("{}{}c={}", base, sep, customer_id),
    }
}

/// Replaces every `{name}` whose name is known.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(close) if is_var_name(&after[..close]) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_var_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn vars() -> TemplateVars {
        let mut v = TemplateVars::new();
        v.insert("first_name", "Dana");
        v.insert("coupon_code", "K7QPM2XA");
        v
    }

    #[test]
    fn test_render_known_and_unknown() {
        assert_eq!(
            render("Hi {first_name}, code {coupon_code}!", &vars()),
            "Hi Dana, code K7QPM2XA!"
        );
        assert_eq!(render("Hi {nickname}", &vars()), "Hi {nickname}");
        assert_eq!(render("{ not a var } {", &vars()), "{ not a var } {");
        assert_eq!(render("{{first_name}}", &vars()), "{Dana}");
    }

    #[test]
    fn test_for_recipient() {
        let now = Utc::now();
        let customer = Customer {
            id: "cust-1".into(),
            first_name: "Dana".into(),
            last_name: Some("Ruiz".into()),
            phone: None,
            email: None,
            tags: vec![],
            visit_count: 6,
            sms_consent: true,
            email_consent: false,
            loyalty_points_balance: 250,
            last_visit_date: Some(now - Duration::days(45)),
            lifetime_spend_cents: 31_050,
            created_at: now,
        };
        let business = BusinessInfo {
            name: "Sparkle Auto Spa".into(),
            phone: "555-0100".into(),
            booking_url: "https://book.example.com/".into(),
            loyalty_cents_per_point: 2,
        };

        let v = TemplateVars::for_recipient(&customer, Some("K7QPM2XA"), &business, now);
        assert_eq!(v.get("name"), Some("Dana Ruiz"));
        assert_eq!(v.get("loyalty_value"), Some("$5.00"));
        assert_eq!(v.get("days_since_last_visit"), Some("45"));
        assert_eq!(v.get("lifetime_spend"), Some("$310.50"));
        assert_eq!(
            v.get("booking_url"),
            Some("https://book.example.com/?c=cust-1&coupon=K7QPM2XA")
        );
    }

    #[test]
    fn test_booking_url_with_existing_query() {
        assert_eq!(
            personalised_booking_url("https://x.test/book?loc=2", "c9", None),
            "https://x.test/book?loc=2&c=c9"
        );
        assert_eq!(personalised_booking_url("", "c9", Some("A")), "");
    }
}
