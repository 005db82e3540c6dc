//! Caller deadlines for RPCs.
//!
//! gRPC clients send their remaining budget in the `grpc-timeout` header. The
//! whole operation runs under that budget; when it runs out the operation's
//! future is dropped, which abandons any in-flight I/O and rolls back an open
//! transaction.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tonic::metadata::MetadataMap;
use tracing::warn;

use crate::errors::ServiceError;

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    budget: Option<Duration>,
}

impl Deadline {
    /// No deadline; the operation runs to completion.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn within(budget: Duration) -> Self {
        Self {
            budget: Some(budget),
        }
    }

    /// Reads `grpc-timeout`. A missing or malformed header means no deadline.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(Self::within)
            .unwrap_or_default()
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Runs `operation`, giving up with `DeadlineExceeded` when the budget is spent.
    pub async fn run<T, F>(self, operation: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let Some(budget) = self.budget else {
            return operation.await;
        };

        match tokio::time::timeout(budget, operation).await {
            Ok(result) => result,
            Err(_) => {
                counter!("petcare_rpc.deadline_exceeded", 1);
                warn!(?budget, "Deadline exceeded, operation abandoned");
                Err(ServiceError::DeadlineExceeded)
            }
        }
    }
}

/// Parses a `grpc-timeout` value: up to eight digits and a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[rstest]
    #[case("1H", Some(Duration::from_secs(3600)))]
    #[case("2M", Some(Duration::from_secs(120)))]
    #[case("30S", Some(Duration::from_secs(30)))]
    #[case("250m", Some(Duration::from_millis(250)))]
    #[case("99999999u", Some(Duration::from_micros(99_999_999)))]
    #[case("5n", Some(Duration::from_nanos(5)))]
    #[case("S", None)]
    #[case("123456789S", None)]
    #[case("10x", None)]
    #[case("-1S", None)]
    #[case("+1S", None)]
    fn grpc_timeout_values(#[case] raw: &str, #[case] expected: Option<Duration>) {
        assert_eq!(parse_grpc_timeout(raw), expected);
    }

    #[test]
    fn deadline_from_metadata() {
        let mut metadata = MetadataMap::new();
        assert_eq!(Deadline::from_metadata(&metadata), Deadline::none());

        metadata.insert(GRPC_TIMEOUT_HEADER, "100m".parse().unwrap());
        assert_eq!(
            Deadline::from_metadata(&metadata).budget(),
            Some(Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn run_completes_within_budget() {
        let result = Deadline::within(Duration::from_secs(5))
            .run(async { Ok::<_, ServiceError>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn run_abandons_slow_operation() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = Deadline::within(Duration::from_millis(20))
            .run(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ServiceError>(())
            })
            .await;

        assert_matches!(result, Err(ServiceError::DeadlineExceeded));
        assert!(!finished.load(Ordering::SeqCst));
    }
}
