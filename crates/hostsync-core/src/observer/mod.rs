//! Public IP observer
//!
//! Holds the last known public IP and classifies each new lookup as a
//! baseline, a change, or no change. The held value is only replaced by a
//! successful lookup; failures leave it untouched.

use std::net::IpAddr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::IpSource;

/// Result of one IP lookup compared with the held value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpObservation {
    /// First successful lookup; there was nothing to compare against
    Baseline(IpAddr),
    /// The address differs from the held value
    Changed { previous: IpAddr, current: IpAddr },
    /// Same address as before
    Unchanged(IpAddr),
}

impl IpObservation {
    /// The freshly observed address
    pub fn current(&self) -> IpAddr {
        match *self {
            IpObservation::Baseline(ip) | IpObservation::Unchanged(ip) => ip,
            IpObservation::Changed { current, .. } => current,
        }
    }

    /// Whether this observation should start a full reconciliation pass
    ///
    /// The baseline counts: the first successful lookup drives the initial pass.
    pub fn triggers_pass(&self) -> bool {
        !matches!(self, IpObservation::Unchanged(_))
    }
}

/// Plain value inequality
pub fn has_changed(previous: IpAddr, current: IpAddr) -> bool {
    previous != current
}

/// Tracks the host's public IP across lookups
pub struct IpObserver {
    source: Box<dyn IpSource>,
    current: RwLock<Option<IpAddr>>,
}

impl IpObserver {
    /// Create an observer with no baseline yet
    pub fn new(source: Box<dyn IpSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
        }
    }

    /// The held IP, if any lookup has succeeded
    pub async fn current(&self) -> Option<IpAddr> {
        *self.current.read().await
    }

    /// Look up the public IP and compare it with the held value
    pub async fn observe(&self) -> Result<IpObservation> {
        let ip = self.source.current().await.map_err(|e| match e {
            Error::IpLookup(_) => e,
            other => Error::ip_lookup(format!("{} lookup failed: {}", self.source.source_name(), other)),
        });

        let ip = match ip {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Public IP lookup failed, keeping previous value: {}", e);
                return Err(e);
            }
        };

        let previous = self.current.write().await.replace(ip);

        let observation = match previous {
            None => {
                info!("Public IP baseline: {}", ip);
                IpObservation::Baseline(ip)
            }
            Some(previous) if has_changed(previous, ip) => {
                info!("Public IP changed: {} -> {}", previous, ip);
                IpObservation::Changed {
                    previous,
                    current: ip,
                }
            }
            Some(_) => {
                debug!("Public IP unchanged: {}", ip);
                IpObservation::Unchanged(ip)
            }
        };

        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed script of lookup results
    struct ScriptedSource(Mutex<Vec<Result<IpAddr>>>);

    impl ScriptedSource {
        fn new(mut script: Vec<Result<IpAddr>>) -> Self {
            script.reverse();
            Self(Mutex::new(script))
        }
    }

    #[async_trait]
    impl IpSource for ScriptedSource {
        async fn current(&self) -> Result<IpAddr> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::ip_lookup("script exhausted")))
        }
    }

    #[test]
    fn test_baseline_change_and_unchanged() {
        let a = IpAddr::from([1, 1, 1, 1]);
        let b = IpAddr::from([2, 2, 2, 2]);
        let observer = IpObserver::new(Box::new(ScriptedSource::new(vec![Ok(a), Ok(a), Ok(b)])));

        tokio_test::block_on(async {
            let first = observer.observe().await.unwrap();
            assert_eq!(first, IpObservation::Baseline(a));
            assert!(first.triggers_pass());

            let second = observer.observe().await.unwrap();
            assert_eq!(second, IpObservation::Unchanged(a));
            assert!(!second.triggers_pass());

            let third = observer.observe().await.unwrap();
            assert_eq!(third, IpObservation::Changed { previous: a, current: b });
            assert_eq!(observer.current().await, Some(b));
        });
    }

    #[test]
    fn test_failed_lookup_keeps_previous() {
        let a = IpAddr::from([1, 1, 1, 1]);
        let observer = IpObserver::new(Box::new(ScriptedSource::new(vec![
            Ok(a),
            Err(Error::http("timeout")),
        ])));

        tokio_test::block_on(async {
            observer.observe().await.unwrap();
            let err = observer.observe().await.unwrap_err();
            assert!(matches!(err, Error::IpLookup(_)));
            assert_eq!(observer.current().await, Some(a));
        });
    }

    #[test]
    fn test_has_changed_is_value_inequality() {
        let a = IpAddr::from([10, 0, 0, 1]);
        assert!(!has_changed(a, IpAddr::from([10, 0, 0, 1])));
        assert!(has_changed(a, IpAddr::from([10, 0, 0, 2])));
    }
}
