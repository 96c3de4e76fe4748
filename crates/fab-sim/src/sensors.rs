//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Randomized environment and brightness readings."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::time::Duration;

use fab_common::ReactorHandle;
use fab_msg::{BusClient, BRIGHTNESS_TOPIC, ENVIRONMENT_TOPIC};
use rand::prelude::*;
use rand_distr::Uniform;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::frames::{BrightnessFrame, EnvironmentFrame};

/// Seeded generator for sensor frames within realistic shop-floor ranges.
#[derive(Debug)]
pub struct SensorGenerator {
    rng: StdRng,
    temperature: Uniform<f64>,
    humidity: Uniform<f64>,
}

impl SensorGenerator {
    /// Generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            temperature: Uniform::new(20.0, 26.0),
            humidity: Uniform::new(35.0, 40.0),
        }
    }

    /// Next environment frame.
    pub fn environment(&mut self) -> EnvironmentFrame {
        EnvironmentFrame {
            ts: crate::timestamp(),
            t: self.temperature.sample(&mut self.rng),
            rt: self.temperature.sample(&mut self.rng),
            h: self.humidity.sample(&mut self.rng),
            rh: self.humidity.sample(&mut self.rng),
            p: self.rng.gen_range(1000..=1200),
            iaq: self.rng.gen_range(100..=500),
            aq: self.rng.gen_range(0..=3),
            gr: self.rng.gen_range(15_000..=170_000),
        }
    }

    /// Next brightness frame.
    pub fn brightness(&mut self) -> BrightnessFrame {
        BrightnessFrame {
            ts: crate::timestamp(),
            br: self.rng.gen_range(0..=60),
            ldr: self.rng.gen_range(15_000..=170_000),
        }
    }
}

/// Publish one environment and one brightness frame every `period`.
pub fn spawn_sensor_publisher(
    bus: BusClient,
    mut generator: SensorGenerator,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> ReactorHandle {
    ReactorHandle::spawn("SensorPublisher", move |mut kill| async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = kill.wait() => break,
                _ = ticker.tick() => {
                    let environment = generator.environment();
                    let brightness = generator.brightness();
                    if let Err(err) = bus.publish_json(ENVIRONMENT_TOPIC, &environment).await {
                        warn!(error = %err, "environment frame not published");
                    }
                    if let Err(err) = bus.publish_json(BRIGHTNESS_TOPIC, &brightness).await {
                        warn!(error = %err, "brightness frame not published");
                    }
                }
            }
        }
        debug!("sensor publisher stopped");
    })
}
