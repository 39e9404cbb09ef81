//! Headless history chart
//!
//! Fills an in-memory history store with synthetic data, drives one chart
//! through a scripted session and logs what a renderer would draw.
//!
//! Usage: `histscope [config.toml]`

use anyhow::Context;
use histscope::{
    chart::LastWrittenJump,
    interaction::{InputEvent, Key},
    AppConfig, BackendMessage, FetchBackend, Frame, FrontendReceiver, HistoryChart, MemoryHistory,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const WIDTH: f64 = 1200.0;
const HEIGHT: f64 = 400.0;

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// One sample per minute over the last two weeks
fn fill_history(history: &MemoryHistory, chart: &HistoryChart, now: f64) {
    let start = now - 14.0 * 86_400.0;
    for (i, var) in chart.variables().iter().enumerate() {
        let phase = i as f64;
        let samples = (0..)
            .map(|k| start + 60.0 * k as f64)
            .take_while(|&t| t <= now)
            .map(|t| (t, 50.0 + 40.0 * ((t / 3600.0) + phase).sin()));
        history.extend(&var.key, samples);
    }
}

/// Exchange commands and replies until the chart is idle
fn settle(chart: &mut HistoryChart, frontend: &FrontendReceiver) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        for command in chart.take_commands() {
            if let Some(event) = frontend.dispatch(command) {
                tracing::debug!(?event, "Chart event");
            }
        }
        if !chart.is_busy() {
            return Ok(());
        }
        if Instant::now() > deadline {
            anyhow::bail!("history reads did not complete in time");
        }
        if let Ok(message) = frontend.receiver.recv_timeout(Duration::from_millis(50)) {
            chart.apply(message, now_secs());
        }
    }
}

fn describe(frame: &Frame) {
    let points: usize = frame.series.iter().map(|s| s.geometry.len()).sum();
    let labels: Vec<String> = frame
        .time_axis
        .iter()
        .flat_map(|plan| plan.labels())
        .filter_map(|t| t.label.clone())
        .collect();
    tracing::info!(
        t_min = frame.window.t_min,
        t_max = frame.window.t_max,
        y_min = frame.range.y_min,
        y_max = frame.range.y_max,
        points,
        bin_size = ?frame.average_bin_size,
        "Frame"
    );
    tracing::info!("Time labels: {}", labels.join(" | "));
    if let Some(alert) = &frame.status.alert {
        tracing::warn!("Alert: {}", alert);
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,histscope=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref());
    if config.panel.variables.is_empty() {
        config.panel.variables = vec!["Demo:Sine[0]".into(), "Demo:Sine[1]".into()];
    }

    let mut chart = HistoryChart::new(config, WIDTH, HEIGHT).context("building chart")?;
    let keys = chart.variables().iter().map(|v| v.key.clone()).collect();

    let history = Arc::new(MemoryHistory::new());
    let now = now_secs();
    fill_history(&history, &chart, now);

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    let (backend, frontend) = FetchBackend::new(history, keys, runtime.handle().clone());
    let backend_thread = std::thread::spawn(move || backend.run());

    tracing::info!("Loading initial window");
    chart.start(now, None);
    settle(&mut chart, &frontend)?;
    describe(&chart.render(now_secs()));

    tracing::info!("Zooming out twice");
    chart.zoom_out(now_secs());
    settle(&mut chart, &frontend)?;
    chart.zoom_out(now_secs());
    settle(&mut chart, &frontend)?;
    describe(&chart.render(now_secs()));

    tracing::info!("Showing the last ten days (binned)");
    chart.show_last(10.0 * 86_400.0, now_secs());
    settle(&mut chart, &frontend)?;
    describe(&chart.render(now_secs()));

    tracing::info!("Jumping to the last written data");
    chart.jump_to_last_written(LastWrittenJump::Any, now_secs());
    for command in chart.take_commands() {
        frontend.dispatch(command);
    }
    while let Ok(message) = frontend.receiver.recv_timeout(Duration::from_secs(2)) {
        let answered = matches!(
            message,
            BackendMessage::LastWritten { .. } | BackendMessage::LastWrittenFailed { .. }
        );
        chart.apply(message, now_secs());
        if answered {
            break;
        }
    }
    settle(&mut chart, &frontend)?;
    describe(&chart.render(now_secs()));

    tracing::info!("Resetting axes");
    chart.handle_input(InputEvent::Key(Key::Char('r')), now_secs());
    settle(&mut chart, &frontend)?;
    describe(&chart.render(now_secs()));

    frontend.shutdown();
    backend_thread
        .join()
        .map_err(|_| anyhow::anyhow!("fetch backend panicked"))?;
    Ok(())
}
