use std::time::Duration;

use color_eyre::Result;
use dut_keel::{config::Config, error::Error, mock::MockDutBuilder, port::Port, session::Session};
use pretty_assertions::assert_eq;

mod common;
use common::TIMEOUT;

#[tokio::test]
async fn power_cycles_are_expected_restarts() -> Result<()> {
    let mock = common::mock().await?;
    let mut session = Session::start(&mock, common::cable("cycles"), &common::config()).await?;

    for boots in 1..=3 {
        session.power_cycle().await?;
        assert_eq!(session.restart_detector().boots_seen(), boots);
        session.check_no_restart()?;

        let runner = session.command_runner().await?;
        assert_eq!(runner.run_command("calculate").await?, ["42"]);
    }

    session.finish().await?;
    mock.stop().await;
    Ok(())
}

#[tokio::test]
async fn cable_is_connected_after_finishing() -> Result<()> {
    let mock = common::mock().await?;
    let mut session = Session::start(&mock, common::cable("finish"), &common::config()).await?;

    session.power_cycle().await?;
    session.finish().await?;

    let state = tokio::fs::read_to_string(common::state_file("finish")).await?;
    assert_eq!(state, "connected");

    mock.stop().await;
    Ok(())
}

#[tokio::test]
async fn reboot_is_reported_once() -> Result<()> {
    let mock = common::mock().await?;
    let mut session = Session::start(&mock, common::cable("once"), &common::config()).await?;

    session.power_cycle().await?;

    mock.send("reboot".into())?;
    session
        .restart_detector()
        .wait_for_boots(2, TIMEOUT)
        .await?;

    assert!(matches!(
        session.check_no_restart(),
        Err(Error::UnexpectedRestart)
    ));
    // Cleared by checking.
    session.check_no_restart()?;

    session.finish().await?;
    mock.stop().await;
    Ok(())
}

#[tokio::test]
async fn finish_reports_unexpected_restart() -> Result<()> {
    let mock = common::mock().await?;
    let session = Session::start(&mock, common::cable("report"), &common::config()).await?;

    mock.send("reboot".into())?;
    session
        .restart_detector()
        .wait_for_boots(1, TIMEOUT)
        .await?;

    assert!(matches!(
        session.finish().await,
        Err(Error::UnexpectedRestart)
    ));

    mock.stop().await;
    Ok(())
}

#[tokio::test]
async fn slow_device_fails_power_cycle() -> Result<()> {
    let mock = MockDutBuilder::new()
        .set_line_delay(Duration::from_millis(50))
        .build()
        .await?;
    let config = Config {
        boot_timeout_ms: 100,
        ..common::config()
    };
    let mut session = Session::start(&mock, common::cable("slow"), &config).await?;

    let err = session.power_cycle().await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");

    drop(session);
    mock.stop().await;
    Ok(())
}
