//! # Seed Data Generator
//!
//! Populates the database with demo customers, coupons and a draft campaign
//! for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 customers (default)
//! cargo run -p perk-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p perk-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p perk-db --bin seed -- --db ./data/perk.db
//! ```
//!
//! ## Generated Data
//! - Customers with a spread of visit counts, tags, consent flags and
//!   last-visit dates, plus completed transactions for repeat visitors
//! - `SAVE20`: 20% off the order, minimum purchase $40.00
//! - `FREEWASH`: a free Basic Wash for new customers
//! - A draft win-back campaign with an A/B split and a coupon template

use chrono::{Duration, Utc};
use perk_core::{
    AudienceFilter, Campaign, CampaignChannel, CampaignStatus, CampaignVariant, ConditionLogic,
    Coupon, CouponReward, CouponStatus, Customer, DiscountType, RewardScope, TagMatchMode,
    Transaction, TransactionStatus,
};
use perk_db::{Database, DbConfig};
use std::env;
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &[
    "Ava", "Liam", "Maya", "Noah", "Zara", "Omar", "Lena", "Ravi", "Iris", "Theo", "Nia", "Sam",
];

const LAST_NAMES: &[&str] = &[
    "Khan", "Silva", "Okafor", "Brown", "Nguyen", "Garcia", "Kowalski", "Ahmed", "Rossi",
];

const TAGS: &[&[&str]] = &[&[], &["vip"], &["fleet"], &["vip", "fleet"], &["student"]];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./perk_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Perk Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of customers to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./perk_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Perk Seed Data Generator");
    println!("===========================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customers().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} customers", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating customers...");
    let start = std::time::Instant::now();

    let mut generated = 0;
    let mut transactions = 0;
    for seed in 0..count {
        let customer = generate_customer(seed);
        if let Err(e) = db.customers().insert(&customer).await {
            eprintln!("Failed to insert {}: {}", customer.id, e);
            continue;
        }
        generated += 1;

        if let Some(last_visit) = customer.last_visit_date {
            let tx = Transaction {
                id: Uuid::new_v4().to_string(),
                customer_id: Some(customer.id.clone()),
                total_cents: 2500 + ((seed * 37) % 6000) as i64,
                transaction_date: last_visit,
                status: TransactionStatus::Completed,
                coupon_id: None,
            };
            db.transactions().insert(&tx).await?;
            transactions += 1;
        }

        if generated % 100 == 0 {
            println!("  Generated {} customers...", generated);
        }
    }

    println!(
        "✓ Generated {} customers and {} transactions in {:?}",
        generated,
        transactions,
        start.elapsed()
    );

    println!();
    println!("Creating coupons...");
    let (save20, save20_rewards) = save20();
    db.coupons().insert(&save20, &save20_rewards).await?;
    println!("  ✓ {}", save20.code);

    let (freewash, freewash_rewards) = freewash();
    db.coupons().insert(&freewash, &freewash_rewards).await?;
    println!("  ✓ {}", freewash.code);

    println!();
    println!("Creating draft campaign...");
    let campaign = db_campaign(&db).await?;
    println!("  ✓ {} ({})", campaign.name, campaign.id);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single customer from a deterministic seed.
fn generate_customer(seed: usize) -> Customer {
    let now = Utc::now();
    let first = FIRST_NAMES[seed % FIRST_NAMES.len()];
    let last = LAST_NAMES[(seed / FIRST_NAMES.len()) % LAST_NAMES.len()];

    // Every seventh customer has never visited
    let visit_count = if seed % 7 == 0 { 0 } else { (seed % 13) as i64 };
    let last_visit_date = (visit_count > 0).then(|| now - Duration::days((seed * 11 % 120) as i64));

    Customer {
        id: format!("cust-{:05}", seed),
        first_name: first.to_string(),
        last_name: Some(last.to_string()),
        phone: (seed % 5 != 0).then(|| format!("+1555{:07}", seed)),
        email: (seed % 3 != 0).then(|| format!("{}.{}{}@example.com", first, last, seed).to_lowercase()),
        tags: TAGS[seed % TAGS.len()].iter().map(|t| t.to_string()).collect(),
        visit_count,
        sms_consent: seed % 4 != 0,
        email_consent: seed % 2 == 0,
        loyalty_points_balance: visit_count * 25,
        last_visit_date,
        lifetime_spend_cents: visit_count * 3200,
        created_at: now - Duration::days(365),
    }
}

fn base_coupon(code: &str, name: &str) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        name: Some(name.to_string()),
        status: CouponStatus::Active,
        expires_at: None,
        max_uses: None,
        use_count: 0,
        is_single_use: false,
        min_purchase_cents: None,
        max_customer_visits: None,
        customer_id: None,
        customer_tags: None,
        tag_match_mode: TagMatchMode::Any,
        requires_service_ids: vec![],
        requires_service_category_ids: vec![],
        requires_product_id: None,
        requires_product_category_id: None,
        condition_logic: ConditionLogic::And,
        campaign_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn base_reward(coupon_id: &str, applies_to: RewardScope, discount_type: DiscountType, value: i64) -> CouponReward {
    CouponReward {
        id: Uuid::new_v4().to_string(),
        coupon_id: coupon_id.to_string(),
        applies_to,
        discount_type,
        discount_value: value,
        max_discount_cents: None,
        target_product_id: None,
        target_service_id: None,
        target_product_category_id: None,
        target_service_category_id: None,
        target_label: None,
    }
}

fn save20() -> (Coupon, Vec<CouponReward>) {
    let mut coupon = base_coupon("SAVE20", "20% off orders over $40");
    coupon.min_purchase_cents = Some(4000);
    // 20% in basis points
    let reward = base_reward(&coupon.id, RewardScope::Order, DiscountType::Percentage, 2000);
    (coupon, vec![reward])
}

fn freewash() -> (Coupon, Vec<CouponReward>) {
    let mut coupon = base_coupon("FREEWASH", "Free Basic Wash for new customers");
    coupon.max_customer_visits = Some(0);
    let mut reward = base_reward(&coupon.id, RewardScope::Service, DiscountType::Free, 0);
    reward.target_service_id = Some("svc-basic".into());
    reward.target_label = Some("Basic Wash".into());
    (coupon, vec![reward])
}

async fn db_campaign(db: &Database) -> Result<Campaign, Box<dyn std::error::Error>> {
    let now = Utc::now();

    // Per-recipient coupons are cloned from this template at send time.
    let mut template = base_coupon("WINBACK-TEMPLATE", "Win-back 15% off");
    template.is_single_use = true;
    template.expires_at = Some(now + Duration::days(30));
    let reward = base_reward(&template.id, RewardScope::Order, DiscountType::Percentage, 1500);
    db.coupons().insert(&template, &[reward]).await?;

    let campaign = Campaign {
        id: Uuid::new_v4().to_string(),
        name: "We miss you".into(),
        channel: CampaignChannel::Both,
        status: CampaignStatus::Draft,
        audience_filters: AudienceFilter::LastVisitBeforeDays { days: 45 },
        sms_template: Some(
            "Hi {first_name}, it's been {days_since_last_visit} days! Use {coupon_code} for 15% off: {booking_url}"
                .into(),
        ),
        email_subject: Some("{first_name}, come back for 15% off".into()),
        email_template: Some(
            "Hi {first_name},\n\nWe haven't seen you in {days_since_last_visit} days. Book with code {coupon_code}: {booking_url}\n\n{business_name}"
                .into(),
        ),
        coupon_id: Some(template.id.clone()),
        scheduled_at: None,
        sent_at: None,
        recipient_count: 0,
        delivered_count: 0,
        created_at: now,
        updated_at: now,
    };

    db.campaigns().insert(&campaign).await?;

    for (label, split, body) in [
        ("A", 50, None),
        (
            "B",
            50,
            Some("{first_name}, your {coupon_code} code is waiting. Book now: {booking_url}"),
        ),
    ] {
        db.campaigns()
            .insert_variant(&CampaignVariant {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign.id.clone(),
                label: label.into(),
                split_percentage: split,
                message_body: body.map(str::to_string),
                email_subject: None,
            })
            .await?;
    }

    Ok(campaign)
}
