use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tripool_core::gateway::{GatewayError, HoldAuthorization, PaymentGateway, VirtualCard};

/// In-memory gateway stand-in, wired in when no real processor is
/// configured and used throughout the test suites.
///
/// Behavior is steered through magic payment-method tokens: `pm_declined`
/// declines the hold, `pm_unreachable` fails with a transient error, and
/// `pm_hang` never resolves (exercises the caller's deadline). Holds are
/// deduplicated by idempotency key, so replaying a placement returns the
/// original authorization.
pub struct MockGateway {
    seq: AtomicU64,
    holds: Mutex<HashMap<String, HoldAuthorization>>,
    voided: Mutex<HashSet<String>>,
    captured: Mutex<HashSet<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(1),
            holds: Mutex::new(HashMap::new()),
            voided: Mutex::new(HashSet::new()),
            captured: Mutex::new(HashSet::new()),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn was_voided(&self, hold_ref: &str) -> bool {
        self.voided.lock().await.contains(hold_ref)
    }

    pub async fn was_captured(&self, hold_ref: &str) -> bool {
        self.captured.lock().await.contains(hold_ref)
    }

    pub async fn holds_placed(&self) -> usize {
        self.holds.lock().await.len()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn place_hold(
        &self,
        _amount: i64,
        _currency: &str,
        payment_method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<HoldAuthorization, GatewayError> {
        // Replay of a key returns the original hold, whatever the method.
        if let Some(existing) = self.holds.lock().await.get(idempotency_key) {
            return Ok(existing.clone());
        }

        match payment_method {
            Some("pm_declined") => {
                return Err(GatewayError::Declined {
                    reason: "card declined".to_string(),
                })
            }
            Some("pm_unreachable") => {
                return Err(GatewayError::Transient("connection refused".to_string()))
            }
            Some("pm_hang") => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }

        let n = self.next_seq();
        let auth = HoldAuthorization {
            hold_ref: format!("auth_{n}"),
            client_secret: Some(format!("secret_{n}")),
        };
        self.holds
            .lock()
            .await
            .insert(idempotency_key.to_string(), auth.clone());
        Ok(auth)
    }

    async fn void_hold(&self, hold_ref: &str) -> Result<(), GatewayError> {
        self.voided.lock().await.insert(hold_ref.to_string());
        Ok(())
    }

    async fn capture_hold(&self, hold_ref: &str) -> Result<(), GatewayError> {
        self.captured.lock().await.insert(hold_ref.to_string());
        Ok(())
    }

    async fn issue_virtual_card(
        &self,
        _funded_amount: i64,
        _currency: &str,
    ) -> Result<VirtualCard, GatewayError> {
        let n = self.next_seq();
        Ok(VirtualCard {
            card_ref: format!("vcard_{n}"),
            last_four: "4242".to_string(),
            brand: "visa".to_string(),
            exp_month: 12,
            exp_year: 2030,
        })
    }
}
