#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use color_eyre::Result;
use dut_keel::{cable::ChargingCable, config::Config, logging, mock::MockDut};
use tracing::Level;

pub const TIMEOUT: Duration = Duration::from_secs(2);

pub async fn mock() -> Result<MockDut> {
    logging::init(Level::INFO, None).await;

    Ok(MockDut::start().await?)
}

pub fn config() -> Config {
    Config {
        boot_timeout_ms: 2_000,
        command_timeout_ms: 1_000,
        ..Default::default()
    }
}

pub fn state_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dut-keel-test-{name}-{}.txt", std::process::id()))
}

pub fn cable(name: &str) -> ChargingCable {
    ChargingCable::new(state_file(name)).with_settle_time(Duration::ZERO)
}

/// Some filler lines, numbered so that order can be checked.
/// The words are random, so keep the result around to compare against.
pub fn filler_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{i}: {}", lipsum::lipsum_words(i % 7 + 1)))
        .collect()
}
