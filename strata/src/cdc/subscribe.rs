//! CDC subscriptions: handlers invoked for each record in commit
//! order. A handler's failure is isolated — logged, optionally surfaced to
//! an `onError` callback — and never prevents other subscribers from
//! seeing the same record, nor fails the commit that produced it.

use super::record::ChangeRecord;

type Handler = Box<dyn Fn(&ChangeRecord) -> Result<(), String> + Send + Sync>;
type ErrorHook = Box<dyn Fn(&ChangeRecord, &str) + Send + Sync>;

struct Subscriber {
    handler: Handler,
    on_error: Option<ErrorHook>,
}

/// Registry of CDC subscribers for one table. `dispatch` is called by the
/// table engine after every commit that produced change records.
#[derive(Default)]
pub struct CdcDispatcher {
    subscribers: Vec<Subscriber>,
}

impl CdcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        handler: impl Fn(&ChangeRecord) -> Result<(), String> + Send + Sync + 'static,
        on_error: Option<Box<dyn Fn(&ChangeRecord, &str) + Send + Sync>>,
    ) {
        self.subscribers.push(Subscriber { handler: Box::new(handler), on_error });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `records` to every subscriber, in commit order. A handler
    /// that returns `Err` is logged via `tracing::error!` with the failing
    /// record's version/change-type for context, and its own `on_error`
    /// hook (if any) is invoked — the error never reaches other
    /// subscribers or the caller.
    pub fn dispatch(&self, records: &[ChangeRecord]) {
        for record in records {
            for subscriber in &self.subscribers {
                if let Err(reason) = (subscriber.handler)(record) {
                    tracing::error!(
                        version = record.commit_version,
                        change_type = record.change_type.as_str(),
                        error = %reason,
                        "CDC subscriber handler failed"
                    );
                    if let Some(on_error) = &subscriber.on_error {
                        on_error(record, &reason);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::record::ChangeType;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn record() -> ChangeRecord {
        ChangeRecord {
            change_type: ChangeType::Insert,
            commit_version: 1,
            commit_timestamp_millis: 0,
            data: Default::default(),
        }
    }

    #[test]
    fn a_failing_subscriber_does_not_block_others() {
        let mut dispatcher = CdcDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        dispatcher.subscribe(|_r| Err("boom".to_string()), None);

        let seen2 = seen.clone();
        dispatcher.subscribe(
            move |r| {
                seen2.lock().push(r.commit_version);
                Ok(())
            },
            None,
        );

        dispatcher.dispatch(&[record()]);
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn on_error_hook_receives_failure_reason() {
        let mut dispatcher = CdcDispatcher::new();
        let captured = Arc::new(Mutex::new(None));
        let captured2 = captured.clone();
        dispatcher.subscribe(
            |_r| Err("nope".to_string()),
            Some(Box::new(move |_r, reason| {
                *captured2.lock() = Some(reason.to_string());
            })),
        );
        dispatcher.dispatch(&[record()]);
        assert_eq!(captured.lock().as_deref(), Some("nope"));
    }
}
