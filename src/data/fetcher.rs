//! Fetch worker pool - runs transport requests off the viewer thread

use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, error, warn};

use crate::error::AssetError;
use crate::framework::Framework;
use crate::promise::{Deferred, Promise};
use crate::scope::{Scope, Utility};

use super::Transport;

type Job = Box<dyn FnOnce() + Send>;

/// Shared pool of fetch workers for one scope
pub struct Fetcher {
    jobs: Option<Sender<Job>>,
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, num_workers: usize) -> Self {
        // flume gives us MPMC: every worker pulls from the same queue
        let (jobs_tx, jobs_rx) = flume::unbounded::<Job>();

        let mut spawned = 0;
        for index in 0..num_workers.max(1) {
            let rx = jobs_rx.clone();
            let result = thread::Builder::new()
                .name(format!("crocodoc-fetch-{index}"))
                .spawn(move || fetch_worker(rx));
            match result {
                Ok(_) => spawned += 1,
                Err(e) => error!("Failed to spawn fetch worker {index}: {e}"),
            }
        }

        // Without workers, jobs run on the calling thread
        let jobs = (spawned > 0).then_some(jobs_tx);
        Self { jobs, transport }
    }

    /// Fetch `url` and convert the body with `process`.
    ///
    /// Retryable failures are retried up to `retries` more times. The
    /// promise's cancellation token is checked before every attempt.
    pub fn fetch<T, F>(&self, url: String, retries: usize, process: F) -> Promise<T, AssetError>
    where
        T: Clone + Send + 'static,
        F: Fn(&str, Vec<u8>) -> Result<T, AssetError> + Send + 'static,
    {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        let transport = Arc::clone(&self.transport);

        let job: Job = Box::new(move || {
            run_fetch(transport.as_ref(), &url, retries, &deferred, process);
        });
        self.submit(job);
        promise
    }

    fn submit(&self, job: Job) {
        match &self.jobs {
            Some(jobs) => {
                if let Err(flume::SendError(job)) = jobs.send(job) {
                    warn!("Fetch workers are gone, running request inline");
                    job();
                }
            }
            None => job(),
        }
    }
}

impl Utility for Fetcher {
    fn create(framework: &Framework, scope: &Scope) -> Self {
        let workers = scope.config().fetch_workers;
        Fetcher::new(framework.transport(), workers)
    }
}

fn fetch_worker(jobs: Receiver<Job>) {
    // Exits once the owning fetcher is dropped
    for job in jobs {
        job();
    }
}

fn run_fetch<T, F>(
    transport: &dyn Transport,
    url: &str,
    retries: usize,
    deferred: &Deferred<T, AssetError>,
    process: F,
) where
    T: Clone + Send + 'static,
    F: Fn(&str, Vec<u8>) -> Result<T, AssetError>,
{
    for attempt in 0..=retries {
        if deferred.is_cancelled() {
            debug!("Request for {url} aborted before attempt {}", attempt + 1);
            return;
        }

        let result = transport
            .fetch(url)
            .map_err(|err| AssetError::Transport {
                resource: url.to_string(),
                error: err.to_string(),
            })
            .and_then(|body| process(url, body));

        match result {
            Ok(asset) => {
                deferred.resolve(asset);
                return;
            }
            Err(err) if err.is_retryable() && attempt < retries => {
                warn!("Attempt {} for {url} failed, retrying: {err}", attempt + 1);
            }
            Err(err) => {
                debug!("Request for {url} failed: {err}");
                deferred.reject(err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;
    use crate::promise::{Outcome, Status};
    use crate::test_utils::{GatedTransport, ScriptedTransport};

    const WAIT: Duration = Duration::from_secs(5);

    fn text(url: &str, body: Vec<u8>) -> Result<String, AssetError> {
        String::from_utf8(body).map_err(|err| AssetError::Decode {
            resource: url.to_string(),
            error: err.to_string(),
        })
    }

    #[test]
    fn retries_transport_failures_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("u", Err(TransportError::Status { status: 503 }));
        transport.respond("u", Ok(b"body".to_vec()));
        let fetcher = Fetcher::new(transport.clone(), 2);

        let outcome = fetcher.fetch("u".into(), 1, text).wait_timeout(WAIT);

        assert_eq!(outcome, Some(Outcome::Resolved("body".to_string())));
        assert_eq!(transport.request_count("u"), 2);
    }

    #[test]
    fn gives_up_after_retry_bound() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.respond("u", Err(TransportError::Network("reset".into())));
        }
        let fetcher = Fetcher::new(transport.clone(), 1);

        let outcome = fetcher.fetch("u".into(), 1, text).wait_timeout(WAIT);

        match outcome {
            Some(Outcome::Rejected(AssetError::Transport { resource, error })) => {
                assert_eq!(resource, "u");
                assert!(error.contains("reset"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(transport.request_count("u"), 2);
    }

    #[test]
    fn parse_failures_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("u", Ok(b"{".to_vec()));
        transport.respond("u", Ok(b"{}".to_vec()));
        let fetcher = Fetcher::new(transport.clone(), 1);

        let promise = fetcher.fetch("u".into(), 1, |url, _body| -> Result<(), AssetError> {
            Err(AssetError::Parse {
                resource: url.to_string(),
                error: "unexpected end".into(),
            })
        });

        assert_eq!(promise.wait_timeout(WAIT).map(|o| o.status()), Some(Status::Rejected));
        assert_eq!(transport.request_count("u"), 1);
    }

    #[test]
    fn abort_stops_further_attempts() {
        let transport = Arc::new(GatedTransport::new());
        let fetcher = Fetcher::new(transport.clone(), 1);

        let promise = fetcher.fetch("u".into(), 1, text);
        transport.wait_entered();
        promise.abort();
        transport.release(Err(TransportError::Network("late".into())));

        assert_eq!(promise.wait_timeout(WAIT), Some(Outcome::Cancelled));
        // Give the worker a moment; no second attempt may start
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.attempts(), 1);
    }

    #[test]
    fn abort_after_load_is_noop() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("u", Ok(b"done".to_vec()));
        let fetcher = Fetcher::new(transport, 1);

        let promise = fetcher.fetch("u".into(), 1, text);
        promise.wait_timeout(WAIT);
        promise.abort();

        assert_eq!(promise.status(), Status::Resolved);
    }
}
