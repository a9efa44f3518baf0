//! Idle session sweep. A session that has not been touched within the idle
//! timeout goes down the same termination path as an explicit disconnect.

use crate::session::SessionRegistry;
use events::TerminationReason;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Terminates every session idle for longer than `idle_timeout`, returning how many.
pub async fn sweep(registry: &SessionRegistry, idle_timeout: Duration) -> usize {
    let mut terminated = 0;
    for session_id in registry.expired(idle_timeout) {
        if registry
            .terminate(&session_id, TerminationReason::IdleTimeout)
            .await
        {
            terminated += 1;
        }
    }
    terminated
}

pub fn spawn(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        "Starting liveness sweep every {}s, idle timeout {}s",
        interval.as_secs(),
        idle_timeout.as_secs()
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let terminated = sweep(&registry, idle_timeout).await;
            if terminated > 0 {
                info!("Liveness sweep terminated {terminated} idle session(s)");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::message::{ClientEvent, PresenceState, ServerEvent};
    use crate::testing::{connect, drain, fixture};
    use crate::RelayConfig;

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_terminated_and_reported_offline() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let (active, mut active_rx) = connect(&fx).await;
        let (idle, _idle_rx) = connect(&fx).await;
        fx.hub.router().subscribe(&active.id, &general).await.unwrap();
        fx.hub.router().subscribe(&idle.id, &general).await.unwrap();
        drain(&mut active_rx);

        tokio::time::advance(Duration::from_secs(60)).await;
        fx.hub.dispatch(&active.id, ClientEvent::Ping).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let terminated = sweep(fx.hub.registry(), Duration::from_secs(90)).await;

        assert_eq!(terminated, 1);
        assert!(fx.hub.registry().lookup(&idle.id).is_err());
        assert!(fx.hub.registry().lookup(&active.id).is_ok());
        assert!(drain(&mut active_rx).contains(&ServerEvent::Presence {
            channel_id: general,
            user_id: idle.user_id,
            session_id: idle.id.clone(),
            state: PresenceState::Offline,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_runs_on_its_interval() {
        let fx = fixture(RelayConfig {
            session_idle_timeout: Duration::from_secs(30),
            liveness_sweep_interval: Duration::from_secs(10),
            ..RelayConfig::default()
        });
        let (idle, _rx) = connect(&fx).await;
        let handle = fx.hub.spawn_liveness_sweeper();

        tokio::time::sleep(Duration::from_secs(45)).await;

        assert!(fx.hub.registry().lookup(&idle.id).is_err());
        handle.abort();
    }
}
