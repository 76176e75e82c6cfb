//! # Variant Assigner
//!
//! Deterministic A/B split of a recipient list.
//!
//! ## Mechanism
//! ```text
//!  ids (deduped, sorted):  c000 c001 c002 ... c999          n = 1000
//!  variants:               A 30%        B 70%
//!  cumulative boundaries:  round(n × 30/100) = 300, round(n × 100/100) = 1000
//!
//!  position:   0 ─────────── 299 │ 300 ──────────────────── 999
//!  variant:          A           │             B
//! ```
//! Each boundary is within half a recipient of exact, so every variant gets
//! its share ±1. Positions past the last boundary (splits under 100%) keep
//! the base template.

use std::collections::BTreeMap;

use crate::campaign::CampaignVariant;
use crate::error::ValidationResult;
use crate::validation::validate_variant_splits;

/// Customer id → assigned variant id (`None` = base template).
pub type VariantAssignment = BTreeMap<String, Option<String>>;

/// Assigns every distinct customer to at most one variant.
///
/// Same inputs always give the same assignment, regardless of input order.
pub fn assign_variants(
    customer_ids: &[String],
    variants: &[CampaignVariant],
) -> ValidationResult<VariantAssignment> {
    validate_variant_splits(variants)?;

    let mut ids: Vec<&String> = customer_ids.iter().collect();
    ids.sort();
    ids.dedup();

    let n = ids.len() as i64;
    let mut cumulative = 0;
    let boundaries: Vec<(i64, &str)> = variants
        .iter()
        .map(|v| {
            cumulative += v.split_percentage;
            ((n * cumulative + 50) / 100, v.id.as_str())
        })
        .collect();

    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(pos, id)| {
            let variant = boundaries
                .iter()
                .find(|(bound, _)| (pos as i64) < *bound)
                .map(|(_, vid)| vid.to_string());
            (id.clone(), variant)
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
