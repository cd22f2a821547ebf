//! Promo code evaluation
//!
//! Pure eligibility and discount arithmetic, shared by the validate
//! endpoint and the booking flow. Consuming a use is NOT done here — the
//! usage increment is a guarded UPDATE in `db::queries::promo` so that
//! concurrent applies cannot overrun the limit.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{DiscountCode, DiscountType};

/// Why a code is not currently usable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("promo code is disabled")]
    Disabled,
    #[error("promo code is not active yet")]
    NotYetActive,
    #[error("promo code has expired")]
    Expired,
    #[error("promo code usage limit reached")]
    Exhausted,
}

/// Check eligibility at `now` and compute the discount for `total`.
///
/// The window check comes before the usage check: an expired code is
/// reported as expired even when uses remain.
pub fn evaluate(code: &DiscountCode, total: f64, now: DateTime<Utc>) -> Result<f64, PromoRejection> {
    check_usable(code, now)?;
    Ok(discount_amount(code.discount_type, code.value, total))
}

/// Eligibility alone, without the arithmetic
pub fn check_usable(code: &DiscountCode, now: DateTime<Utc>) -> Result<(), PromoRejection> {
    if !code.is_active {
        return Err(PromoRejection::Disabled);
    }
    if now < code.starts_at {
        return Err(PromoRejection::NotYetActive);
    }
    if now > code.ends_at {
        return Err(PromoRejection::Expired);
    }
    if code.remaining_uses() <= 0 {
        return Err(PromoRejection::Exhausted);
    }
    Ok(())
}

/// Discount amount for an order total.
///
/// Percentage: `value * total / 100`. Fixed: `value`, clamped so the
/// discount never exceeds the total.
pub fn discount_amount(discount_type: DiscountType, value: f64, total: f64) -> f64 {
    match discount_type {
        DiscountType::Percentage => value * total / 100.0,
        DiscountType::Fixed => value.min(total),
    }
}

/// Alphabet for generated codes — no 0/O/1/I lookalikes
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random promo code of `len` characters
pub fn generate_code(len: usize) -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn code(discount_type: DiscountType, value: f64) -> DiscountCode {
        let now = Utc::now();
        DiscountCode {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            discount_type,
            value,
            usage_limit: 100,
            used_count: 0,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let c = code(DiscountType::Percentage, 10.0);
        let amount = evaluate(&c, 1000.0, Utc::now()).unwrap();
        assert!((amount - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fixed_discount_clamped_to_total() {
        let c = code(DiscountType::Fixed, 150.0);
        let amount = evaluate(&c, 100.0, Utc::now()).unwrap();
        assert!((amount - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fixed_discount_below_total() {
        let c = code(DiscountType::Fixed, 50.0);
        let amount = evaluate(&c, 100.0, Utc::now()).unwrap();
        assert!((amount - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_before_window_even_with_uses_left() {
        let mut c = code(DiscountType::Percentage, 10.0);
        c.starts_at = Utc::now() + Duration::days(1);
        c.ends_at = Utc::now() + Duration::days(2);
        assert_eq!(
            evaluate(&c, 1000.0, Utc::now()),
            Err(PromoRejection::NotYetActive)
        );
    }

    #[test]
    fn test_rejects_after_window_even_with_uses_left() {
        let mut c = code(DiscountType::Percentage, 10.0);
        c.starts_at = Utc::now() - Duration::days(2);
        c.ends_at = Utc::now() - Duration::days(1);
        assert_eq!(evaluate(&c, 1000.0, Utc::now()), Err(PromoRejection::Expired));
    }

    #[test]
    fn test_rejects_exhausted_code() {
        let mut c = code(DiscountType::Percentage, 10.0);
        c.used_count = c.usage_limit;
        assert_eq!(
            evaluate(&c, 1000.0, Utc::now()),
            Err(PromoRejection::Exhausted)
        );
    }

    #[test]
    fn test_rejects_disabled_code() {
        let mut c = code(DiscountType::Percentage, 10.0);
        c.is_active = false;
        assert_eq!(
            evaluate(&c, 1000.0, Utc::now()),
            Err(PromoRejection::Disabled)
        );
    }

    #[test]
    fn test_generate_code_length_and_charset() {
        let code = generate_code(10);
        assert_eq!(code.len(), 10);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_window_outranks_exhaustion() {
        let mut c = code(DiscountType::Percentage, 10.0);
        c.ends_at = Utc::now() - Duration::hours(1);
        c.used_count = c.usage_limit;
        // Expired is reported, not Exhausted
        assert_eq!(evaluate(&c, 1000.0, Utc::now()), Err(PromoRejection::Expired));
    }
}
