//! Alarm driven volume resizer
//!
//! ## Run
//!
//! ```text
//! notification → AlarmContext → VolumeResolver → volume id
//!              → current size → modify_volume(target size) → OsExtension
//! ```
//!
//! Every step appends to a [`Narrative`]. Whatever happens, the narrative is
//! published exactly once at the end of the run when notifications are
//! enabled.
//!
//! ## Concurrency
//!
//! Runs are independent and may overlap. A volume is claimed for the whole
//! run once its id is known, so a second alarm for a volume that is still
//! being resized by this process ends as a reported failure instead of issuing
//! a second modification.

pub mod alarm;
pub mod extend;
pub mod narrative;
pub mod volume;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument, warn};

use crate::command::RemoteCommandRunner;
use crate::config::{Config, PollingConfig};
use crate::services::Services;

pub use alarm::{AlarmContext, AlarmParseError, NotificationEnvelope};
pub use extend::{OsExtension, target_size};
pub use narrative::Narrative;
pub use volume::{DeviceName, ResolveError, VolumeId, VolumeResolver};

#[derive(Debug, Clone)]
pub struct ResizeSettings {
    pub threshold: u8,
    pub desired: u8,
    pub os_extend_delay_secs: u64,
    pub alarm_prefix: String,
    pub notifications_enabled: bool,
}

impl ResizeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.scaling.threshold_utilisation,
            desired: config.scaling.desired_utilisation,
            os_extend_delay_secs: config.scaling.os_extend_delay_secs,
            alarm_prefix: config.agent.alarm_prefix.clone(),
            notifications_enabled: config.notification.enabled,
        }
    }
}

/// Where a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Completed,
    InvalidAlarm,
    Unresolved,
    /// Another run of this process is resizing the same volume
    AlreadyResizing,
    SizeUnavailable,
    ModifyFailed,
    ExtensionFailed,
}

#[derive(Debug, Clone)]
pub struct ResizeReport {
    pub narrative: Narrative,
    pub outcome: ResizeOutcome,
}

type InFlight = Arc<Mutex<HashSet<VolumeId>>>;

/// Claim on a volume, released when dropped
struct VolumeClaim {
    volume: VolumeId,
    in_flight: InFlight,
}

impl Drop for VolumeClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.volume);
    }
}

pub struct Resizer {
    services: Services,
    runner: RemoteCommandRunner,
    settings: ResizeSettings,
    in_flight: InFlight,
}

impl Resizer {
    pub fn new(services: Services, polling: &PollingConfig, settings: ResizeSettings) -> Self {
        let runner = RemoteCommandRunner::new(services.commands.clone(), polling);
        Self {
            services,
            runner,
            settings,
            in_flight: Arc::default(),
        }
    }

    fn claim(&self, volume: &VolumeId) -> Option<VolumeClaim> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(volume.clone());

        inserted.then(|| VolumeClaim {
            volume: volume.clone(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Handle one alarm notification from start to finish
    #[instrument(skip_all)]
    pub async fn handle(&self, envelope: &NotificationEnvelope) -> ResizeReport {
        let mut narrative = Narrative::new();
        let outcome = self.run(envelope, &mut narrative).await;

        if self.settings.notifications_enabled {
            self.services.notifications.publish(&narrative.render()).await;
        } else {
            debug!("notifications disabled, narrative not published");
        }

        ResizeReport { narrative, outcome }
    }

    async fn run(&self, envelope: &NotificationEnvelope, narrative: &mut Narrative) -> ResizeOutcome {
        let context = match AlarmContext::from_envelope(&self.settings.alarm_prefix, envelope) {
            Ok(context) => context,
            Err(e) => {
                narrative.failure(format!("Failed to read alarm notification: {e}"));
                narrative.failure("Failed to execute volume scaling.");
                return ResizeOutcome::InvalidAlarm;
            }
        };

        narrative.record(format!("\"{}\" alarm triggered.", context.alarm_name));
        narrative.record(format!(
            "Starting volume scaling for \"{}\".",
            context.instance_id
        ));
        debug!("metric metadata: {:?}", context.disk);

        narrative.record("Finding volume id.");
        let volume = match self.resolve(&context).await {
            Ok(volume) => volume,
            Err(e) => {
                warn!("volume resolution for {} failed: {e}", context.disk.identifier());
                narrative.failure("Failed to find volume id.");
                narrative.failure("Failed to execute volume scaling.");
                return ResizeOutcome::Unresolved;
            }
        };
        narrative.record(format!("VolumeId : {volume}"));

        let Some(_claim) = self.claim(&volume) else {
            narrative.failure(format!("Volume {volume} is already being resized."));
            narrative.failure("Failed to execute volume scaling.");
            return ResizeOutcome::AlreadyResizing;
        };

        let current = match self.services.instances.volume_size(volume.as_str()).await {
            Ok(size) => size,
            Err(e) => {
                narrative.failure(format!("ERROR OCCURED :: {e}"));
                return ResizeOutcome::SizeUnavailable;
            }
        };
        narrative.record(format!("Current volume size : {current}GB"));

        let Some(target) = target_size(self.settings.threshold, current, self.settings.desired)
        else {
            narrative.failure("Target volume size is out of range.");
            narrative.failure("Failed to execute volume scaling.");
            return ResizeOutcome::SizeUnavailable;
        };
        narrative.record(format!("Target volume size  : {target}GB"));

        narrative.record("Modifying volume.");
        if let Err(e) = self
            .services
            .instances
            .modify_volume(volume.as_str(), target)
            .await
        {
            narrative.failure("Failed to modify volume.");
            narrative.failure(format!("ERROR OCCURED :: {e}"));
            return ResizeOutcome::ModifyFailed;
        }
        narrative.record("Successfully modified volume.");

        let extension = OsExtension::for_disk(&context.disk);
        narrative.record(format!(
            "Starting to extend partition \"{}\" at OS level.",
            extension.label()
        ));

        let result = self
            .runner
            .execute(
                &context.instance_id,
                extension.document(),
                &extension.script(self.settings.os_extend_delay_secs),
            )
            .await;

        if result.is_success() {
            narrative.record("Volume scaling completed successfully.");
            ResizeOutcome::Completed
        } else {
            narrative.failure("Failed to complete volume scaling at OS level.");
            ResizeOutcome::ExtensionFailed
        }
    }

    async fn resolve(&self, context: &AlarmContext) -> Result<VolumeId, ResolveError> {
        VolumeResolver::classify(&context.disk)?
            .resolve(
                &context.instance_id,
                &self.runner,
                self.services.instances.as_ref(),
            )
            .await
    }
}
