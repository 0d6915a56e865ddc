use crate::replica::Term;
use crate::transport::TransportError;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// How the collector should count a single peer reply.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Verdict {
    Ack,
    NoAck,
    HigherTerm(Term),
}

/// What one bounded fan-out gathered before it stopped.
#[derive(Debug)]
pub(crate) struct FanOutOutcome<D, O> {
    // Includes ourselves.
    pub(crate) acks: usize,
    pub(crate) higher_term: Option<Term>,
    // Only the replies that arrived before the collector stopped. Stragglers are dropped.
    pub(crate) replies: Vec<(D, Result<O, TransportError>)>,
}

/// Bounds for one fan-out.
#[derive(Debug, Copy, Clone)]
pub(crate) struct FanOutBounds {
    pub(crate) rpc_timeout: Duration,
    pub(crate) window: Duration,
    // Including ourselves.
    pub(crate) acks_needed: usize,
    // Keep collecting past `acks_needed` until every call answers or the window closes.
    pub(crate) wait_for_all: bool,
}

/// `fan_out()` spawns every call as its own task, each bounded by `rpc_timeout`, and collects
/// replies until one of these happens:
/// * acks (counting ourselves as one) reach `acks_needed`, unless `wait_for_all` is set
/// * some reply carries a higher term
/// * every call has answered
/// * the window closes
///
/// Calls that haven't answered by then keep running in the background, and their replies are
/// discarded.
pub(crate) async fn fan_out<D, O, Fut, J>(
    calls: Vec<(D, Fut)>,
    bounds: FanOutBounds,
    judge: J,
) -> FanOutOutcome<D, O>
where
    D: Send + 'static,
    O: Send + 'static,
    Fut: Future<Output = Result<O, TransportError>> + Send + 'static,
    J: Fn(&D, &Result<O, TransportError>) -> Verdict,
{
    let deadline = Instant::now() + bounds.window;
    let mut outcome = FanOutOutcome {
        acks: 1,
        higher_term: None,
        replies: Vec::with_capacity(calls.len()),
    };

    let (tx, mut rx) = mpsc::channel(calls.len().max(1));
    for (descriptor, call) in calls {
        let tx = tx.clone();
        let rpc_timeout = bounds.rpc_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(rpc_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };
            // Collector may have already returned.
            let _ = tx.send((descriptor, result)).await;
        });
    }
    drop(tx);

    while bounds.wait_for_all || outcome.acks < bounds.acks_needed {
        let (descriptor, result) = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(reply)) => reply,
            // Everyone answered.
            Ok(None) => break,
            // Window closed.
            Err(_) => break,
        };

        let verdict = judge(&descriptor, &result);
        outcome.replies.push((descriptor, result));
        match verdict {
            Verdict::Ack => outcome.acks += 1,
            Verdict::NoAck => {}
            Verdict::HigherTerm(term) => {
                outcome.higher_term = Some(term);
                break;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;

    type Call = Pin<Box<dyn Future<Output = Result<u64, TransportError>> + Send>>;

    fn reply_after(delay_ms: u64, value: u64) -> Call {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(value)
        })
    }

    fn never() -> Call {
        Box::pin(async {
            std::future::pending::<()>().await;
            Ok(0)
        })
    }

    fn fail() -> Call {
        Box::pin(async { Err(TransportError::Rpc("boom".into())) })
    }

    fn bounds(acks_needed: usize) -> FanOutBounds {
        FanOutBounds {
            rpc_timeout: Duration::from_millis(200),
            window: Duration::from_millis(300),
            acks_needed,
            wait_for_all: false,
        }
    }

    // Values > 100 are terms higher than ours, 1 is an ack, 0 is not.
    fn judge(_: &&'static str, result: &Result<u64, TransportError>) -> Verdict {
        match result {
            Ok(v) if *v > 100 => Verdict::HigherTerm(Term::new(*v)),
            Ok(1) => Verdict::Ack,
            _ => Verdict::NoAck,
        }
    }

    #[tokio::test]
    async fn stops_at_majority_without_waiting_for_stragglers() {
        let start = Instant::now();
        let calls = vec![("a", reply_after(0, 1)), ("b", reply_after(5, 1)), ("c", never()), ("d", never())];

        let outcome = fan_out(calls, bounds(3), judge).await;

        assert_eq!(outcome.acks, 3);
        assert_eq!(outcome.higher_term, None);
        assert_eq!(outcome.replies.len(), 2);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_no_acks() {
        let start = Instant::now();
        let calls = vec![("a", fail()), ("b", never()), ("c", reply_after(0, 0))];

        let outcome = fan_out(calls, bounds(2), judge).await;

        assert_eq!(outcome.acks, 1);
        // Per-call timeout (200ms) fires before the window (300ms), so every call answers.
        assert_eq!(outcome.replies.len(), 3);
        assert!(matches!(
            outcome.replies.iter().find(|(d, _)| *d == "b"),
            Some((_, Err(TransportError::Timeout)))
        ));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn wait_for_all_keeps_replies_past_majority() {
        let calls = vec![("a", reply_after(0, 1)), ("b", reply_after(10, 0)), ("c", never())];
        let bounds = FanOutBounds {
            rpc_timeout: Duration::from_millis(50),
            window: Duration::from_millis(300),
            acks_needed: 2,
            wait_for_all: true,
        };

        let outcome = fan_out(calls, bounds, judge).await;

        assert_eq!(outcome.acks, 2);
        // The slow non-ack and the timed out call are both reported.
        assert_eq!(outcome.replies.len(), 3);
        assert!(outcome.replies.iter().any(|(d, r)| *d == "b" && matches!(r, Ok(0))));
        assert!(matches!(
            outcome.replies.iter().find(|(d, _)| *d == "c"),
            Some((_, Err(TransportError::Timeout)))
        ));
    }

    #[tokio::test]
    async fn higher_term_ends_round_immediately() {
        let start = Instant::now();
        let calls = vec![("a", reply_after(0, 0)), ("b", reply_after(10, 107)), ("c", never())];

        let outcome = fan_out(calls, bounds(3), judge).await;

        assert_eq!(outcome.higher_term, Some(Term::new(107)));
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn window_bounds_the_round() {
        let start = Instant::now();
        let calls = vec![("a", never()), ("b", never())];
        let bounds = FanOutBounds {
            rpc_timeout: Duration::from_secs(10),
            window: Duration::from_millis(40),
            acks_needed: 2,
            wait_for_all: false,
        };

        let outcome = fan_out(calls, bounds, judge).await;

        assert_eq!(outcome.acks, 1);
        assert!(outcome.replies.is_empty());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40) && elapsed < Duration::from_secs(5), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn single_node_needs_no_replies() {
        let calls: Vec<(&'static str, Call)> = Vec::new();
        let outcome = fan_out(calls, bounds(1), judge).await;
        assert_eq!(outcome.acks, 1);
        assert!(outcome.replies.is_empty());
    }
}
