//! Trial, subscription and streak bookkeeping on top of the repository.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::ProblemRepository;
use crate::errors::RepoError;
use crate::models::{PaymentRecord, SubscriptionStatus, UserProfile};

pub const TRIAL_DAYS: i64 = 30;
pub const SUBSCRIPTION_DAYS: i64 = 30;
/// Monthly price in rupees.
pub const SUBSCRIPTION_PRICE: u32 = 50;

pub fn new_profile(user_id: &str, email: &str, now: DateTime<Utc>) -> UserProfile {
    UserProfile {
        id: user_id.to_string(),
        email: email.to_string(),
        subscription_status: SubscriptionStatus::Trial,
        trial_start: now,
        trial_end: now + Duration::days(TRIAL_DAYS),
        subscription_start: None,
        subscription_end: None,
        streak_count: 0,
        last_login: now,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionBadge {
    Pro,
    Expired,
    Free,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubscriptionView {
    pub label: String,
    pub badge: SubscriptionBadge,
}

pub fn subscription_view(profile: &UserProfile, now: DateTime<Utc>) -> SubscriptionView {
    match profile.subscription_status {
        SubscriptionStatus::Active => match profile.subscription_end {
            Some(end) if now > end => SubscriptionView {
                label: "Subscription Expired".into(),
                badge: SubscriptionBadge::Expired,
            },
            _ => SubscriptionView { label: "Pro Member".into(), badge: SubscriptionBadge::Pro },
        },
        _ if now > profile.trial_end => SubscriptionView {
            label: "Trial Expired".into(),
            badge: SubscriptionBadge::Expired,
        },
        _ => {
            let left = profile.trial_end - now;
            // Partial days count as a whole day.
            let days = (left.num_seconds() + 86_399) / 86_400;
            SubscriptionView {
                label: format!("Trial: {} days left", days),
                badge: SubscriptionBadge::Free,
            }
        }
    }
}

/// Streak after a check-in on `today`, given the previous check-in date.
pub fn next_streak(last_login: NaiveDate, today: NaiveDate, current: u32) -> u32 {
    if last_login == today {
        current
    } else if today.pred_opt() == Some(last_login) {
        current + 1
    } else {
        1
    }
}

pub async fn check_in(repo: &dyn ProblemRepository, user_id: &str, now: DateTime<Utc>) -> Result<u32, RepoError> {
    let profile = repo
        .get_profile(user_id)
        .await?
        .ok_or_else(|| RepoError::NotFound(user_id.to_string()))?;

    let streak = next_streak(profile.last_login.date_naive(), now.date_naive(), profile.streak_count);
    repo.update_login(user_id, now, streak).await?;
    info!(%user_id, streak, "daily check-in recorded");
    Ok(streak)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Minor units (paisa).
    pub amount: u32,
    pub currency: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn checkout_options() -> CheckoutOptions {
    CheckoutOptions {
        amount: SUBSCRIPTION_PRICE * 100,
        currency: "INR",
        name: "ProblemBaba",
        description: "Monthly Subscription - Unlimited AI Solutions",
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Confirmed { payment_id: String, message: String },
    /// Money moved but the account row could not be updated.
    PaidButAccountNotUpdated { payment_id: String, message: String },
}

/// Records a completed checkout and opens a new subscription window.
pub async fn confirm_payment(
    repo: &dyn ProblemRepository,
    user_id: &str,
    payment_id: &str,
    now: DateTime<Utc>,
) -> PaymentOutcome {
    let payment = PaymentRecord {
        payment_id: payment_id.to_string(),
        user_id: user_id.to_string(),
        amount: SUBSCRIPTION_PRICE,
        status: "completed".into(),
        created_at: now,
    };
    // Best-effort; the subscription update decides the outcome.
    if let Err(e) = repo.save_payment(&payment).await {
        warn!(%user_id, %payment_id, error = %e, "failed to save payment record");
    }

    match repo
        .activate_subscription(user_id, now, now + Duration::days(SUBSCRIPTION_DAYS))
        .await
    {
        Ok(()) => {
            info!(%user_id, %payment_id, "subscription activated");
            PaymentOutcome::Confirmed {
                payment_id: payment_id.to_string(),
                message: "Payment Successful! Welcome to ProblemBaba Pro!".into(),
            }
        }
        Err(e) => {
            error!(%user_id, %payment_id, error = %e, "payment succeeded but subscription update failed");
            PaymentOutcome::PaidButAccountNotUpdated {
                payment_id: payment_id.to_string(),
                message: "Payment successful but there was an error updating your account. Please contact support."
                    .into(),
            }
        }
    }
}
