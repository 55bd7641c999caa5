//! Runtime context: one cache, one thread per configured connection.
//!
//! The cache is the only state the loops share. Construction of every
//! loop happens before any thread starts, so a configuration problem in
//! the last connection leaves nothing running.

use std::sync::Arc;

use pubsub_cache::Cache;
use pubsub_common::clock::{Clock, MonotonicClock};
use pubsub_common::pubsub::config::PubSubConfig;
use pubsub_transport::{ReceiveTransport, SendTransport, UdpReceiver, UdpSender};
use tracing::{info, warn};

use crate::error::{PublisherError, RuntimeError, SubscriberError};
use crate::publisher::{Publisher, PublisherLoop};
use crate::stats::{PublisherStats, SubscriberStats};
use crate::subscriber::{Subscriber, SubscriberLoop};

/// Result of one joined loop.
#[derive(Debug)]
pub struct LoopReport<S, E> {
    /// Thread name.
    pub name: String,
    /// Statistics, or the error that ended the loop.
    pub result: Result<S, E>,
}

/// Results of every joined loop, in configuration order.
#[derive(Debug, Default)]
pub struct RuntimeReport {
    /// One entry per publisher.
    pub publishers: Vec<LoopReport<PublisherStats, PublisherError>>,
    /// One entry per subscriber.
    pub subscribers: Vec<LoopReport<SubscriberStats, SubscriberError>>,
}

impl RuntimeReport {
    /// True when every loop stopped without error.
    pub fn is_clean(&self) -> bool {
        self.publishers.iter().all(|r| r.result.is_ok())
            && self.subscribers.iter().all(|r| r.result.is_ok())
    }
}

/// Process-wide PubSub context.
pub struct PubSubRuntime {
    config: PubSubConfig,
    cache: Arc<Cache>,
    publishers: Vec<Publisher>,
    subscribers: Vec<Subscriber>,
}

impl PubSubRuntime {
    /// Validate `config` and build the cache. No thread is started.
    ///
    /// A configuration without connections yields an empty, valid cache.
    pub fn initialize(config: PubSubConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let cache = Arc::new(Cache::initialize(&config)?);
        info!(
            service = %config.shared.service_name,
            publishers = config.publisher.len(),
            subscribers = config.subscriber.len(),
            cache_entries = cache.len(),
            "PubSub runtime initialized"
        );
        Ok(Self {
            config,
            cache,
            publishers: Vec::new(),
            subscribers: Vec::new(),
        })
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The validated configuration.
    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    /// True while loop threads exist.
    pub fn is_started(&self) -> bool {
        !self.publishers.is_empty() || !self.subscribers.is_empty()
    }

    /// Names of loops whose thread has already returned.
    ///
    /// Loops only return on their own after a fatal error, so a non-empty
    /// list before [`Self::stop`] means the runtime is degraded.
    pub fn finished_loops(&self) -> Vec<String> {
        let publishers = self
            .publishers
            .iter()
            .filter(|p| p.is_finished())
            .map(|p| p.name().to_string());
        let subscribers = self
            .subscribers
            .iter()
            .filter(|s| s.is_finished())
            .map(|s| s.name().to_string());
        publishers.chain(subscribers).collect()
    }

    /// Open UDP sockets for every connection and start the loops on the
    /// monotonic clock.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        let senders = self
            .config
            .publisher
            .iter()
            .map(|cfg| {
                UdpSender::from_config(cfg).map_err(|e| RuntimeError::Publisher {
                    name: cfg.name.clone(),
                    source: e.into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let receivers = self
            .config
            .subscriber
            .iter()
            .map(|cfg| {
                UdpReceiver::from_config(cfg).map_err(|e| RuntimeError::Subscriber {
                    name: cfg.name.clone(),
                    source: e.into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.start_with(senders, receivers, MonotonicClock::new())
    }

    /// Start the loops on caller-provided transports, one per configured
    /// publisher and subscriber in configuration order.
    pub fn start_with<S, R, C>(
        &mut self,
        senders: Vec<S>,
        receivers: Vec<R>,
        clock: C,
    ) -> Result<(), RuntimeError>
    where
        S: SendTransport + 'static,
        R: ReceiveTransport + 'static,
        C: Clock + Clone,
    {
        if self.is_started() {
            return Err(RuntimeError::AlreadyStarted);
        }
        check_count("send", self.config.publisher.len(), senders.len())?;
        check_count("receive", self.config.subscriber.len(), receivers.len())?;

        let mut publisher_loops = Vec::with_capacity(senders.len());
        for (cfg, transport) in self.config.publisher.iter().zip(senders) {
            let lp = PublisherLoop::new(cfg, Arc::clone(&self.cache), transport, clock.clone())
                .map_err(|source| RuntimeError::Publisher {
                    name: cfg.name.clone(),
                    source,
                })?;
            publisher_loops.push((lp, cfg.rt));
        }
        let mut subscriber_loops = Vec::with_capacity(receivers.len());
        for (cfg, transport) in self.config.subscriber.iter().zip(receivers) {
            let lp = SubscriberLoop::new(cfg, Arc::clone(&self.cache), transport, clock.clone())
                .map_err(|source| RuntimeError::Subscriber {
                    name: cfg.name.clone(),
                    source,
                })?;
            subscriber_loops.push((lp, cfg.rt));
        }

        for (lp, rt) in publisher_loops {
            let name = lp.name().to_string();
            let handle = lp
                .spawn(rt)
                .map_err(|source| RuntimeError::Publisher { name, source })?;
            self.publishers.push(handle);
        }
        for (lp, rt) in subscriber_loops {
            let name = lp.name().to_string();
            let handle = lp
                .spawn(rt)
                .map_err(|source| RuntimeError::Subscriber { name, source })?;
            self.subscribers.push(handle);
        }

        info!(
            publishers = self.publishers.len(),
            subscribers = self.subscribers.len(),
            "PubSub loops started"
        );
        Ok(())
    }

    /// Request a stop of every loop and join them.
    pub fn stop(&mut self) -> RuntimeReport {
        for p in &self.publishers {
            p.stop();
        }
        for s in &self.subscribers {
            s.stop();
        }

        let mut report = RuntimeReport::default();
        for p in self.publishers.drain(..) {
            let name = p.name().to_string();
            report.publishers.push(LoopReport {
                name,
                result: p.join(),
            });
        }
        for s in self.subscribers.drain(..) {
            let name = s.name().to_string();
            report.subscribers.push(LoopReport {
                name,
                result: s.join(),
            });
        }

        if !report.is_clean() {
            warn!("Some PubSub loops ended with an error");
        }
        info!("PubSub loops stopped");
        report
    }

    /// Stop every loop and empty the cache.
    pub fn shutdown(mut self) -> RuntimeReport {
        let report = self.stop();
        self.cache.clear();
        report
    }
}

impl Drop for PubSubRuntime {
    fn drop(&mut self) {
        if self.is_started() {
            self.stop();
        }
    }
}

fn check_count(kind: &'static str, expected: usize, actual: usize) -> Result<(), RuntimeError> {
    if expected != actual {
        return Err(RuntimeError::TransportCount {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_common::clock::ManualClock;
    use pubsub_common::types::NodeId;
    use pubsub_transport::memory::{MemoryReceiver, MemorySender};

    #[test]
    fn empty_configuration_is_valid() {
        let mut rt = PubSubRuntime::initialize(PubSubConfig::default()).unwrap();
        assert!(rt.cache().is_empty());
        assert_eq!(rt.cache().get(&NodeId::string(1, "Counter")), None);

        rt.start_with(
            Vec::<MemorySender>::new(),
            Vec::<MemoryReceiver>::new(),
            ManualClock::default(),
        )
        .unwrap();
        assert!(!rt.is_started());
        assert!(rt.stop().is_clean());
    }

    #[test]
    fn transport_count_checked() {
        let mut rt = PubSubRuntime::initialize(PubSubConfig::default()).unwrap();
        let (tx, _rx) = pubsub_transport::memory::channel(1);
        let err = rt
            .start_with(vec![tx], Vec::<MemoryReceiver>::new(), ManualClock::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::TransportCount {
                kind: "send",
                expected: 0,
                actual: 1
            }
        ));
    }
}
