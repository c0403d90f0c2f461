//! Forward / Compensation traits and their type-erased form.

use async_trait::async_trait;
use std::marker::PhantomData;

use crate::domain::{ActivityFailure, ActivityParameters, ActivityRef, ProcessResult};

/// The "do" half of a step.
///
/// Appends result fragments to `result`; they are merged into the process
/// result only if the call returns `Ok`.
///
/// Plain functions and closures implement this:
/// ```ignore
/// let reserve = |params: &ActivityParameters, result: &mut ProcessResult| {
///     result.add(params.get("seat").cloned().unwrap_or_default());
///     Ok(())
/// };
/// process.execute_with(&reserve, &ReleaseSeat, params).await?;
/// ```
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(
        &self,
        params: &ActivityParameters,
        result: &mut ProcessResult,
    ) -> Result<(), ActivityFailure>;
}

#[async_trait]
impl<F> Forward for F
where
    F: Fn(&ActivityParameters, &mut ProcessResult) -> Result<(), ActivityFailure> + Send + Sync,
{
    async fn forward(
        &self,
        params: &ActivityParameters,
        result: &mut ProcessResult,
    ) -> Result<(), ActivityFailure> {
        (self)(params, result)
    }
}

/// The "undo" half of a step.
///
/// # Naming
/// - `TYPE` is persisted with every step and must stay stable across releases
/// - convention: `{namespace}.{domain}.{action}.v{major}`, e.g. `travel.hotel.cancel.v1`
///
/// `backward` must tolerate being called for a step whose effect was only
/// partially applied, and should be idempotent: after a crash the sweeper may
/// call it again for a step whose earlier backward never got recorded.
#[async_trait]
pub trait Compensation: Send + Sync + 'static {
    const TYPE: &'static str;

    async fn backward(&self, params: &ActivityParameters) -> Result<(), ActivityFailure>;

    fn activity_ref() -> ActivityRef
    where
        Self: Sized,
    {
        ActivityRef::new(Self::TYPE)
    }
}

/// A step that carries its own undo.
pub trait Activity: Forward + Compensation {}

impl<T: Forward + Compensation> Activity for T {}

/// Compensation that always succeeds, for steps with nothing to undo.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompensation;

#[async_trait]
impl Compensation for NoCompensation {
    const TYPE: &'static str = "rewind.noop.v1";

    async fn backward(&self, _params: &ActivityParameters) -> Result<(), ActivityFailure> {
        Ok(())
    }
}

/// Object-safe compensation, keyed by `activity_type`.
#[async_trait]
pub trait DynCompensation: Send + Sync {
    async fn backward_dyn(&self, params: &ActivityParameters) -> Result<(), ActivityFailure>;

    fn activity_type(&self) -> &'static str;
}

/// Erases a typed `Compensation` into a `DynCompensation`.
pub struct TypedCompensation<C: Compensation> {
    inner: C,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Compensation> TypedCompensation<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<C: Compensation> DynCompensation for TypedCompensation<C> {
    async fn backward_dyn(&self, params: &ActivityParameters) -> Result<(), ActivityFailure> {
        self.inner.backward(params).await
    }

    fn activity_type(&self) -> &'static str {
        C::TYPE
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn closures_are_forward_steps() {
        let double = |params: &ActivityParameters,
                      result: &mut ProcessResult|
         -> Result<(), ActivityFailure> {
            let n = params.get_as::<i64>("n").ok_or("missing n")?;
            result.add(n * 2);
            Ok(())
        };

        let mut result = ProcessResult::new();
        double
            .forward(&ActivityParameters::new().with("n", 21), &mut result)
            .await
            .unwrap();
        assert_eq!(result.fragments(), &[serde_json::json!(42)]);

        let err = double
            .forward(&ActivityParameters::new(), &mut ProcessResult::new())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "missing n");
    }

    #[tokio::test]
    async fn typed_compensation_keeps_type_and_behaviour() {
        let log = CallLog::default();
        let erased = TypedCompensation::new(Scripted::new(log.clone()));

        assert_eq!(erased.activity_type(), "test.scripted.v1");
        erased.backward_dyn(&step("a")).await.unwrap();
        let err = erased
            .backward_dyn(&step("b").with("fail_backward", true))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "b undo refused");
        assert_eq!(calls(&log), vec!["a:backward", "b:backward"]);
    }

    #[tokio::test]
    async fn no_compensation_always_succeeds() {
        assert_eq!(NoCompensation::activity_ref().as_str(), "rewind.noop.v1");
        NoCompensation
            .backward(&ActivityParameters::new())
            .await
            .unwrap();
    }
}
