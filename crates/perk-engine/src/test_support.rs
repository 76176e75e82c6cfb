//! Fixtures and test senders for engine tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

use perk_core::{
    AudienceFilter, Campaign, CampaignChannel, CampaignStatus, ConditionLogic, Coupon, CouponReward,
    CouponStatus, Customer, DiscountType, RewardScope, TagMatchMode,
};
use perk_db::{Database, DbConfig};

use crate::sender::{ChannelSender, SendMetadata, SendReceipt};

pub async fn db() -> Arc<Database> {
    Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
}

pub fn customer(id: &str) -> Customer {
    Customer {
        id: id.to_string(),
        first_name: format!("First-{}", id),
        last_name: Some("Tester".into()),
        phone: Some(format!("+1555{}", id)),
        email: Some(format!("{}@example.com", id)),
        tags: vec![],
        visit_count: 2,
        sms_consent: true,
        email_consent: true,
        loyalty_points_balance: 100,
        last_visit_date: Some(Utc::now()),
        lifetime_spend_cents: 10_000,
        created_at: Utc::now(),
    }
}

pub fn coupon(code: &str) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: uuid::Uuid::new_v4().to_string(),
        code: code.to_string(),
        name: None,
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

pub fn reward(coupon_id: &str, applies_to: RewardScope, discount_type: DiscountType, value: i64) -> CouponReward {
    CouponReward {
        id: uuid::Uuid::new_v4().to_string(),
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

pub fn campaign(id: &str, channel: CampaignChannel) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: id.to_string(),
        name: format!("Campaign {}", id),
        channel,
        status: CampaignStatus::Draft,
        audience_filters: AudienceFilter::All,
        sms_template: Some("Hi {first_name}, use {coupon_code}".into()),
        email_subject: Some("Hello {first_name}".into()),
        email_template: Some("Dear {name}, book at {booking_url}".into()),
        coupon_id: None,
        scheduled_at: None,
        sent_at: None,
        recipient_count: 0,
        delivered_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// One captured send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub destination: String,
    pub message: String,
    pub metadata: SendMetadata,
}

/// Records every send; destinations in `failing` get a failed receipt.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<SentMessage>>,
    pub failing: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn fail_for(&self, destination: &str) {
        self.failing.lock().unwrap().insert(destination.to_string());
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, destination: &str, message: &str, metadata: &SendMetadata) -> SendReceipt {
        self.sent.lock().unwrap().push(SentMessage {
            destination: destination.to_string(),
            message: message.to_string(),
            metadata: metadata.clone(),
        });
        if self.failing.lock().unwrap().contains(destination) {
            SendReceipt::failed()
        } else {
            SendReceipt::delivered(format!("rec-{}", destination))
        }
    }
}

/// Blocks every send until [`GatedSender::open`] is called.
pub struct GatedSender {
    pub entered: Notify,
    gate: Semaphore,
}

impl GatedSender {
    pub fn new() -> Self {
        GatedSender {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl ChannelSender for GatedSender {
    async fn send(&self, destination: &str, _message: &str, _metadata: &SendMetadata) -> SendReceipt {
        self.entered.notify_one();
        match self.gate.acquire().await {
            Ok(_permit) => SendReceipt::delivered(format!("gated-{}", destination)),
            Err(_) => SendReceipt::failed(),
        }
    }
}
