//! Demo activities: four booking-like steps that fail at random.

use async_trait::async_trait;
use rand::Rng;
use rewind_core::{
    ActivityFailure, ActivityParameters, Compensation, Forward, ProcessResult,
};

/// Failure odds shared by every demo step.
#[derive(Debug, Clone, Copy)]
pub struct Odds {
    pub forward_failure: f64,
    pub backward_failure: f64,
}

impl Default for Odds {
    fn default() -> Self {
        Self {
            forward_failure: 0.01,
            backward_failure: 0.01,
        }
    }
}

fn roll(probability: f64, what: &str) -> Result<(), ActivityFailure> {
    if rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0)) {
        return Err(ActivityFailure::new(format!("{what}: simulated failure")));
    }
    Ok(())
}

/// Undo of the second step (its forward is a plain closure).
#[derive(Debug, Default)]
pub struct ReleaseQuota {
    pub odds: Odds,
}

#[async_trait]
impl Compensation for ReleaseQuota {
    const TYPE: &'static str = "demo.quota.release.v1";

    async fn backward(&self, _params: &ActivityParameters) -> Result<(), ActivityFailure> {
        roll(self.odds.backward_failure, "release quota")
    }
}

/// Third step: reserves a seat and reports it.
#[derive(Debug, Default)]
pub struct ReserveSeat {
    pub odds: Odds,
}

#[async_trait]
impl Forward for ReserveSeat {
    async fn forward(
        &self,
        params: &ActivityParameters,
        result: &mut ProcessResult,
    ) -> Result<(), ActivityFailure> {
        roll(self.odds.forward_failure, "reserve seat")?;
        if params.get_as::<bool>("arg3").unwrap_or(false) {
            result.add("seat reserved");
        }
        Ok(())
    }
}

#[async_trait]
impl Compensation for ReserveSeat {
    const TYPE: &'static str = "demo.seat.release.v1";

    async fn backward(&self, _params: &ActivityParameters) -> Result<(), ActivityFailure> {
        roll(self.odds.backward_failure, "release seat")
    }
}

/// Fourth step: charges a card, after a short remote call.
#[derive(Debug, Default)]
pub struct ChargeCard {
    pub odds: Odds,
}

#[async_trait]
impl Forward for ChargeCard {
    async fn forward(
        &self,
        params: &ActivityParameters,
        result: &mut ProcessResult,
    ) -> Result<(), ActivityFailure> {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        roll(self.odds.forward_failure, "charge card")?;
        let amount = params.get_as::<f64>("arg4").ok_or("arg4 missing")?;
        result.add(serde_json::json!({ "charged": amount }));
        Ok(())
    }
}

#[async_trait]
impl Compensation for ChargeCard {
    const TYPE: &'static str = "demo.card.refund.v1";

    async fn backward(&self, _params: &ActivityParameters) -> Result<(), ActivityFailure> {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        roll(self.odds.backward_failure, "refund card")
    }
}
