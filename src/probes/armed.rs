//! Arm-state derivation.
//!
//! Re-derived synchronously on every update of the channel sensor or the
//! flight-mode sensor. The result depends only on the latest sensor
//! snapshots and settings.

use std::rc::Rc;

use tracing::info;

use super::ArmState;
use crate::observable::{Observable, Observe, Subscription};
use crate::sensor::types::{ChannelsData, FlightModeData};
use crate::sensor::{SensorChannel, SensorStatus};
use crate::settings::{Settings, SettingsSource};

/// Classify the aircraft from sensor snapshots.
///
/// # Arguments
///
/// * `flight_mode` - Liveness of the flight-mode sensor (its text is irrelevant)
/// * `channels` - Latest channel payload, if any
/// * `settings` - Arm and turtle channel/range configuration
///
/// # Examples
///
/// ```
/// use fpv_aid::probes::{derive_arm_state, ArmState};
/// use fpv_aid::sensor::SensorStatus;
/// use fpv_aid::sensor::types::ChannelsData;
/// use fpv_aid::settings::Settings;
///
/// let mut data = ChannelsData::default();
/// data.channels[4] = 1800; // arm switch high
/// data.channels[5] = 1000; // turtle switch low
///
/// let state = derive_arm_state(SensorStatus::Active, Some(&data), &Settings::default());
/// assert_eq!(state, ArmState::Armed);
///
/// let state = derive_arm_state(SensorStatus::Stale, Some(&data), &Settings::default());
/// assert_eq!(state, ArmState::Off);
/// ```
pub fn derive_arm_state(
    flight_mode: SensorStatus,
    channels: Option<&ChannelsData>,
    settings: &Settings,
) -> ArmState {
    if flight_mode != SensorStatus::Active {
        return ArmState::Off;
    }
    let Some(data) = channels else {
        return ArmState::Off;
    };

    let arm = data.channel(settings.arm_channel);
    if arm < settings.arm_range_min || arm > settings.arm_range_max {
        return ArmState::Disarmed;
    }

    let turtle = data.channel(settings.turtle_channel);
    if turtle >= settings.turtle_range_min && turtle <= settings.turtle_range_max {
        return ArmState::Turtle;
    }

    ArmState::Armed
}

/// Observable arm state.
pub struct ArmedProbe {
    state: Observable<ArmState>,
    subscriptions: Vec<Subscription>,
}

impl ArmedProbe {
    /// Attach to the channel and flight-mode sensors.
    pub fn new(
        channels: &SensorChannel<ChannelsData>,
        flight_mode: &SensorChannel<FlightModeData>,
        settings: Rc<dyn SettingsSource>,
    ) -> Self {
        let state = Observable::new(ArmState::Off);

        let recompute: Rc<dyn Fn()> = {
            let state = state.clone();
            let channels = channels.clone();
            let flight_mode = flight_mode.clone();
            Rc::new(move || {
                let next = derive_arm_state(
                    flight_mode.status(),
                    channels.data().as_ref(),
                    &settings.settings(),
                );
                let prev = state.get();
                if next != prev {
                    info!("Arm state {} -> {}", prev, next);
                    state.set(next);
                }
            })
        };

        let on_channels = Rc::clone(&recompute);
        let on_flight_mode = Rc::clone(&recompute);
        let subscriptions = vec![
            channels.subscribe(move |_| on_channels()),
            flight_mode.subscribe(move |_| on_flight_mode()),
        ];

        recompute();

        Self { state, subscriptions }
    }

    /// Detach from the sensors. Idempotent.
    pub fn dispose(&mut self) {
        self.subscriptions.clear();
    }
}

impl Observe<ArmState> for ArmedProbe {
    fn get(&self) -> ArmState {
        self.state.get()
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ArmState) + 'static,
    {
        self.state.subscribe(listener)
    }
}
