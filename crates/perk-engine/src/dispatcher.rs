//! # Campaign Dispatcher
//!
//! Sends one campaign to its audience.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Campaign Dispatch                                │
//! │                                                                         │
//! │  1. Load + validate (templates, variant splits, coupon template)       │
//! │  2. CAS draft|scheduled → sending   (loser: AlreadyDispatching)        │
//! │  3. Resolve audience, assign variants over the whole audience          │
//! │  4. Skip customers that already have a recipient row                   │
//! │  5. Fan out, at most `max_concurrency` recipients at a time:           │
//! │       mint coupon → render → send per channel → insert recipient row   │
//! │  6. Count stored rows, sending → sent                                  │
//! │                                                                         │
//! │  Send failures: row stored with delivered = false                      │
//! │  Storage failures: no new recipients start, in-flight ones finish,     │
//! │                    campaign stays `sending` until reset_stalled        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use perk_core::code::generate_code;
use perk_core::template::{render, BusinessInfo, TemplateVars};
use perk_core::validation::{validate_campaign_templates, validate_variant_splits};
use perk_core::variant::assign_variants;
use perk_core::{
    Campaign, CampaignChannel, CampaignRecipient, CampaignStatus, CampaignVariant, Coupon,
    CouponReward, CouponStatus, Customer, DispatchSummary,
};
use perk_db::Database;

use crate::audience::AudienceSelector;
use crate::config::{DispatchSettings, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::sender::{ChannelSender, SendMetadata};

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs campaign sends and the campaign lifecycle operations around them.
pub struct CampaignDispatcher {
    db: Arc<Database>,
    sender: Arc<dyn ChannelSender>,
    audience: AudienceSelector,
    settings: DispatchSettings,
    business: Arc<BusinessInfo>,
}

/// Everything a recipient task needs, shared by all tasks of one dispatch.
struct SendContext {
    db: Arc<Database>,
    sender: Arc<dyn ChannelSender>,
    business: Arc<BusinessInfo>,
    campaign: Campaign,
    template: Option<(Coupon, Vec<CouponReward>)>,
    variants: HashMap<String, CampaignVariant>,
    code_attempts: u32,
    now: DateTime<Utc>,
}

/// What happened for one recipient task.
#[derive(Debug, Clone, Copy)]
enum RecipientOutcome {
    Stored { delivered: bool },
    /// A row appeared between the skip check and the insert.
    AlreadyPresent,
    /// Not started because an earlier recipient hit a storage failure.
    Aborted,
}

impl CampaignDispatcher {
    pub fn new(db: Arc<Database>, sender: Arc<dyn ChannelSender>, config: &EngineConfig) -> Self {
        CampaignDispatcher {
            audience: AudienceSelector::new(db.clone(), config.dispatch.customer_page_size),
            db,
            sender,
            settings: config.dispatch.clone(),
            business: Arc::new(config.business_info()),
        }
    }

    /// Dispatches the campaign now.
    pub async fn dispatch(&self, campaign_id: &str) -> EngineResult<DispatchSummary> {
        self.dispatch_at(campaign_id, Utc::now()).await
    }

    /// Dispatches the campaign as of `now`.
    ///
    /// Exactly one concurrent caller gets past the `sending` transition;
    /// the rest fail with [`EngineError::AlreadyDispatching`].
    pub async fn dispatch_at(
        &self,
        campaign_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchSummary> {
        let campaign = self.load(campaign_id).await?;
        Self::check_ready(&campaign, now)?;

        validate_campaign_templates(&campaign)?;
        let variants = self.db.campaigns().variants(campaign_id).await?;
        validate_variant_splits(&variants)?;
        let template = self.load_template(&campaign).await?;

        if !self.db.campaigns().try_begin_sending(campaign_id, now).await? {
            let current = self.load(campaign_id).await?;
            Self::check_ready(&current, now)?;
            // Still looks ready: the other caller moved it and back again.
            return Err(EngineError::AlreadyDispatching {
                campaign_id: campaign_id.to_string(),
            });
        }

        info!(
            campaign_id = %campaign_id,
            channel = %campaign.channel,
            variants = variants.len(),
            templated_coupon = template.is_some(),
            "Campaign dispatch started"
        );

        match self.send_all(campaign, variants, template, now).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(
                    campaign_id = %campaign_id,
                    error = %e,
                    "Campaign dispatch aborted, campaign left in sending"
                );
                Err(e)
            }
        }
    }

    async fn send_all(
        &self,
        campaign: Campaign,
        variants: Vec<CampaignVariant>,
        template: Option<(Coupon, Vec<CouponReward>)>,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchSummary> {
        let campaign_id = campaign.id.clone();

        let customers = self
            .audience
            .resolve(&campaign.audience_filters, campaign.channel, now)
            .await?;

        let assignment = if variants.is_empty() {
            None
        } else {
            let ids: Vec<String> = customers.iter().map(|c| c.id.clone()).collect();
            Some(assign_variants(&ids, &variants)?)
        };

        let existing = self.db.recipients().existing_customer_ids(&campaign_id).await?;
        let (pending, already_sent): (Vec<Customer>, Vec<Customer>) = customers
            .into_iter()
            .partition(|c| !existing.contains(&c.id));
        let mut skipped = already_sent.len() as i64;

        debug!(
            campaign_id = %campaign_id,
            pending = pending.len(),
            already_sent = skipped,
            "Recipients resolved"
        );

        let ctx = Arc::new(SendContext {
            db: self.db.clone(),
            sender: self.sender.clone(),
            business: self.business.clone(),
            campaign,
            template,
            variants: variants.into_iter().map(|v| (v.id.clone(), v)).collect(),
            code_attempts: self.settings.coupon_code_attempts,
            now,
        });

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for customer in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))?;
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let variant_id = assignment
                .as_ref()
                .and_then(|a| a.get(&customer.id).cloned().flatten());
            let ctx = ctx.clone();
            let abort = abort.clone();

            tasks.spawn(async move {
                let _permit = permit;
                if abort.load(Ordering::SeqCst) {
                    return Ok(RecipientOutcome::Aborted);
                }
                let result = send_one(&ctx, &customer, variant_id).await;
                if let Err(e) = &result {
                    warn!(
                        campaign_id = %ctx.campaign.id,
                        customer_id = %customer.id,
                        error = %e,
                        "Recipient failed, stopping dispatch"
                    );
                    abort.store(true, Ordering::SeqCst);
                }
                result
            });
        }

        let mut failed = 0i64;
        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| EngineError::Internal(e.to_string()));
            match outcome.and_then(|r| r) {
                Ok(RecipientOutcome::Stored { delivered: false }) => failed += 1,
                Ok(RecipientOutcome::Stored { delivered: true }) | Ok(RecipientOutcome::Aborted) => {}
                Ok(RecipientOutcome::AlreadyPresent) => skipped += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let counts = self.db.recipients().counts(&campaign_id).await?;
        let sent_at = Utc::now();
        if !self
            .db
            .campaigns()
            .mark_sent(&campaign_id, counts.total, counts.delivered, sent_at)
            .await?
        {
            warn!(campaign_id = %campaign_id, "Campaign left sending before completion was recorded");
        }

        info!(
            campaign_id = %campaign_id,
            recipients = counts.total,
            delivered = counts.delivered,
            failed,
            skipped,
            "Campaign dispatch finished"
        );

        Ok(DispatchSummary {
            campaign_id,
            recipient_count: counts.total,
            delivered_count: counts.delivered,
            failed_count: failed,
            skipped_count: skipped,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// draft|scheduled → scheduled at `at`.
    pub async fn schedule(&self, campaign_id: &str, at: DateTime<Utc>) -> EngineResult<()> {
        let campaign = self.load(campaign_id).await?;
        campaign.schedule_transition()?;
        validate_campaign_templates(&campaign)?;
        validate_variant_splits(&self.db.campaigns().variants(campaign_id).await?)?;

        if !self.db.campaigns().schedule(campaign_id, at).await? {
            self.load(campaign_id).await?.schedule_transition()?;
        }
        info!(campaign_id = %campaign_id, scheduled_at = %at, "Campaign scheduled");
        Ok(())
    }

    /// draft|scheduled → cancelled.
    pub async fn cancel(&self, campaign_id: &str) -> EngineResult<()> {
        self.load(campaign_id).await?.cancel_transition()?;
        if !self.db.campaigns().cancel(campaign_id).await? {
            self.load(campaign_id).await?.cancel_transition()?;
        }
        info!(campaign_id = %campaign_id, "Campaign cancelled");
        Ok(())
    }

    /// sending → scheduled, so a stalled send can be retried.
    ///
    /// The retry skips customers that already have a recipient row.
    pub async fn reset_stalled(&self, campaign_id: &str) -> EngineResult<()> {
        self.load(campaign_id).await?.reset_transition()?;
        if !self.db.campaigns().reset_stalled(campaign_id).await? {
            self.load(campaign_id).await?.reset_transition()?;
        }
        warn!(campaign_id = %campaign_id, "Stalled campaign reset to scheduled");
        Ok(())
    }

    /// Stamps the recipient's first click. Returns `false` for repeat
    /// clicks and unknown recipients.
    pub async fn record_click(&self, campaign_id: &str, customer_id: &str) -> EngineResult<bool> {
        let recorded = self
            .db
            .recipients()
            .record_click(campaign_id, customer_id, Utc::now())
            .await?;
        if recorded {
            debug!(campaign_id = %campaign_id, customer_id = %customer_id, "Click recorded");
        }
        Ok(recorded)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, campaign_id: &str) -> EngineResult<Campaign> {
        self.db
            .campaigns()
            .get(campaign_id)
            .await?
            .ok_or_else(|| EngineError::CampaignNotFound(campaign_id.to_string()))
    }

    fn check_ready(campaign: &Campaign, now: DateTime<Utc>) -> EngineResult<()> {
        match campaign.status {
            CampaignStatus::Sending => Err(EngineError::AlreadyDispatching {
                campaign_id: campaign.id.clone(),
            }),
            status if !status.is_dispatchable() => Err(EngineError::NotDispatchable {
                campaign_id: campaign.id.clone(),
                status,
            }),
            _ => match campaign.scheduled_at {
                Some(at) if !campaign.is_due(now) => Err(EngineError::NotYetDue {
                    campaign_id: campaign.id.clone(),
                    scheduled_at: at,
                }),
                _ => Ok(()),
            },
        }
    }

    async fn load_template(
        &self,
        campaign: &Campaign,
    ) -> EngineResult<Option<(Coupon, Vec<CouponReward>)>> {
        let Some(coupon_id) = campaign.coupon_id.as_deref() else {
            return Ok(None);
        };
        let coupon = self.db.coupons().get_by_id(coupon_id).await?.ok_or_else(|| {
            EngineError::TemplateCouponMissing {
                campaign_id: campaign.id.clone(),
                coupon_id: coupon_id.to_string(),
            }
        })?;
        let rewards = self.db.coupons().rewards_for(coupon_id).await?;
        Ok(Some((coupon, rewards)))
    }
}

// =============================================================================
// Per-recipient work
// =============================================================================

async fn send_one(
    ctx: &SendContext,
    customer: &Customer,
    variant_id: Option<String>,
) -> EngineResult<RecipientOutcome> {
    let campaign = &ctx.campaign;

    let minted = match &ctx.template {
        Some((template, rewards)) => Some(
            mint_recipient_coupon(
                &ctx.db,
                template,
                rewards,
                &campaign.id,
                &customer.id,
                ctx.code_attempts,
                generate_code,
            )
            .await?,
        ),
        None => None,
    };
    let coupon_code = minted.as_ref().map(|c| c.code.clone());

    let vars = TemplateVars::for_recipient(customer, coupon_code.as_deref(), &ctx.business, ctx.now);
    let variant = variant_id.as_deref().and_then(|id| ctx.variants.get(id));

    let mut attempted = Vec::new();
    let mut delivered = false;

    for &channel in campaign.channel.concrete() {
        if !customer.reachable_on(channel) {
            continue;
        }
        let Some((destination, subject, body)) = compose(campaign, variant, customer, channel) else {
            continue;
        };

        let metadata = SendMetadata {
            campaign_id: campaign.id.clone(),
            customer_id: customer.id.clone(),
            channel,
            variant_id: variant_id.clone(),
            subject: subject.map(|s| render(s, &vars)),
        };
        let receipt = ctx.sender.send(destination, &render(body, &vars), &metadata).await;
        if !receipt.success {
            debug!(
                campaign_id = %campaign.id,
                customer_id = %customer.id,
                channel = %channel,
                "Send failed"
            );
        }
        delivered |= receipt.success;
        attempted.push(channel);
    }

    let channel = match attempted.as_slice() {
        [single] => *single,
        [] => campaign.channel,
        _ => CampaignChannel::Both,
    };

    let row = CampaignRecipient {
        id: Uuid::new_v4().to_string(),
        campaign_id: campaign.id.clone(),
        customer_id: customer.id.clone(),
        channel,
        variant_id,
        coupon_code,
        delivered,
        clicked_at: None,
        sent_at: Utc::now(),
    };

    let stored = ctx.db.recipients().insert(&row).await;
    if !matches!(stored, Ok(true)) {
        if let Some(coupon) = &minted {
            disable_orphan(&ctx.db, coupon, customer).await;
        }
    }

    if stored? {
        Ok(RecipientOutcome::Stored { delivered })
    } else {
        Ok(RecipientOutcome::AlreadyPresent)
    }
}

/// Disables a minted coupon whose recipient row was never stored, so the
/// code cannot be redeemed without a send record behind it.
async fn disable_orphan(db: &Database, coupon: &Coupon, customer: &Customer) {
    match db.coupons().set_status(&coupon.id, CouponStatus::Disabled).await {
        Ok(()) => debug!(
            coupon_id = %coupon.id,
            customer_id = %customer.id,
            "Disabled coupon without recipient row"
        ),
        Err(e) => error!(
            coupon_id = %coupon.id,
            customer_id = %customer.id,
            error = %e,
            "Could not disable coupon without recipient row"
        ),
    }
}

/// Destination, subject template and body template for one channel.
fn compose<'a>(
    campaign: &'a Campaign,
    variant: Option<&'a CampaignVariant>,
    customer: &'a Customer,
    channel: CampaignChannel,
) -> Option<(&'a str, Option<&'a str>, &'a str)> {
    let override_body = variant.and_then(|v| v.message_body.as_deref());
    match channel {
        CampaignChannel::Sms => {
            let body = override_body.or(campaign.sms_template.as_deref())?;
            Some((customer.phone.as_deref()?, None, body))
        }
        CampaignChannel::Email => {
            let body = override_body.or(campaign.email_template.as_deref())?;
            let subject = variant
                .and_then(|v| v.email_subject.as_deref())
                .or(campaign.email_subject.as_deref());
            Some((customer.email.as_deref()?, subject, body))
        }
        CampaignChannel::Both => None,
    }
}

/// Clones the template coupon for one customer under a fresh code.
///
/// The clone is single-use, limited to one redemption and pinned to the
/// customer. Code collisions are retried with a new code from `next_code`.
pub async fn mint_recipient_coupon(
    db: &Database,
    template: &Coupon,
    rewards: &[CouponReward],
    campaign_id: &str,
    customer_id: &str,
    attempts: u32,
    mut next_code: impl FnMut() -> String,
) -> EngineResult<Coupon> {
    let now = Utc::now();

    for attempt in 1..=attempts {
        let code = next_code();
        let coupon = Coupon {
            id: Uuid::new_v4().to_string(),
            code,
            name: template.name.clone(),
            status: CouponStatus::Active,
            expires_at: template.expires_at,
            max_uses: Some(1),
            use_count: 0,
            is_single_use: true,
            min_purchase_cents: template.min_purchase_cents,
            max_customer_visits: template.max_customer_visits,
            customer_id: Some(customer_id.to_string()),
            customer_tags: None,
            tag_match_mode: template.tag_match_mode,
            requires_service_ids: template.requires_service_ids.clone(),
            requires_service_category_ids: template.requires_service_category_ids.clone(),
            requires_product_id: template.requires_product_id.clone(),
            requires_product_category_id: template.requires_product_category_id.clone(),
            condition_logic: template.condition_logic,
            campaign_id: Some(campaign_id.to_string()),
            created_at: now,
            updated_at: now,
        };
        let cloned: Vec<CouponReward> = rewards
            .iter()
            .map(|r| CouponReward {
                id: Uuid::new_v4().to_string(),
                coupon_id: coupon.id.clone(),
                ..r.clone()
            })
            .collect();

        match db.coupons().insert(&coupon, &cloned).await {
            Ok(()) => return Ok(coupon),
            Err(e) if e.is_unique_violation() => {
                debug!(attempt, customer_id = %customer_id, "Coupon code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(EngineError::CodeSpaceExhausted { attempts })
}

// =============================================================================
// Unit Tests
// =============================================================================
