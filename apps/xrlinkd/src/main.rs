mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures_util::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xrlink_headless::{HeadlessGraphics, HeadlessSystem, stereo_viewer_pose};
use xrlink_kernel::BridgeBuilder;
use xrlink_protocol::layout::VIEW_RECORD_SIZE;
use xrlink_protocol::{
    Handedness, NativeCallbacks, SessionEventKind, SessionMode, SystemHeap, UserData, ViewRecord,
    decode_input_source, read_hand,
};

use crate::config::{DaemonConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "xrlinkd")]
#[command(about = "xrlink demo daemon: drives a scripted headless XR session")]
struct Cli {
    /// JSON daemon config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SessionMode>,
    #[arg(long)]
    ticks: Option<u32>,
    /// Emit JSON logs regardless of the config.
    #[arg(long)]
    json: bool,
}

fn parse_mode(raw: &str) -> Result<SessionMode, String> {
    [
        SessionMode::Inline,
        SessionMode::ImmersiveVr,
        SessionMode::ImmersiveAr,
    ]
    .into_iter()
    .find(|mode| mode.as_str() == raw || mode.as_raw().to_string() == raw)
    .ok_or_else(|| format!("unknown session mode `{raw}`"))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

fn native_callbacks() -> NativeCallbacks {
    NativeCallbacks::new()
        .on_frame(|_, time, model, views, hands| {
            let left = ViewRecord::decode(views, 0);
            let right = ViewRecord::decode(views, VIEW_RECORD_SIZE);
            info!(
                time,
                model_bytes = model.len(),
                left_viewport = ?left.viewport,
                right_viewport = ?right.viewport,
                left_hand = read_hand(hands, Handedness::Left).is_some(),
                right_hand = read_hand(hands, Handedness::Right).is_some(),
                "native.frame"
            );
        })
        .on_session_start(|user| info!(user_data = user.0, "native.session_start"))
        .on_session_end(|user| info!(user_data = user.0, "native.session_end"))
        .on_error(|user, code| warn!(user_data = user.0, code, "native.error"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.scenario.mode = mode;
    }
    if let Some(ticks) = cli.ticks {
        config.scenario.ticks = ticks;
    }
    if cli.json {
        config.log_format = LogFormat::Json;
    }
    init_tracing(config.log_format);

    let system = Arc::new(HeadlessSystem::new(config.host.clone()));
    let heap = Arc::new(SystemHeap::new());
    let bridge = BridgeBuilder::new(Arc::new(HeadlessGraphics::new()))
        .config(config.runtime.clone())
        .system(system.clone())
        .heap(heap.clone())
        .build();

    let mut transitions = bridge.lifecycle().subscribe_stream();
    let lifecycle_task = tokio::spawn(async move {
        while let Some(Ok(transition)) = transitions.next().await {
            let rendered = serde_json::to_string(&transition).unwrap_or_else(|_| "{}".to_owned());
            info!(transition = %rendered, "lifecycle.transition");
        }
    });

    bridge.set_select_callback(
        Arc::new(|descriptor: &[u8], user: UserData| match decode_input_source(descriptor, 0) {
            Some((source, _)) => info!(
                index = source.index,
                handedness = ?source.handedness,
                has_hand = source.has_hand,
                user_data = user.0,
                "native.select"
            ),
            None => warn!("undecodable input descriptor"),
        }),
        UserData(1),
    );

    let scenario = config.scenario;
    let initialised = bridge
        .init(scenario.mode.as_raw(), native_callbacks(), UserData(0))
        .await;
    if let Err(error) = initialised {
        warn!(%error, "bridge init failed");
    } else if let Err(error) = bridge.request_session().await {
        warn!(%error, "session request failed");
    } else if let Some(session) = system.last_session() {
        bridge.set_projection_params(0.05, 100.0);
        let controllers: Vec<_> = scenario
            .controllers
            .iter()
            .map(|handedness| session.add_controller(*handedness))
            .collect();
        for handedness in &scenario.hands {
            session.add_hand(*handedness);
        }
        let started_at = bridge.runtime().session_started_at().map(|at| at.to_rfc3339());
        info!(
            session_id = ?bridge.runtime().session_id(),
            started_at = ?started_at,
            hand_tracking = bridge.is_hand_tracking_supported(),
            ar = bridge.is_ar_session(),
            "session ready"
        );

        let interval = Duration::from_millis(scenario.frame_interval_ms);
        for tick in 0..scenario.ticks {
            if scenario.tracking_lost.contains(&tick) {
                session.set_viewer_pose(None);
            } else {
                session.set_viewer_pose(Some(stereo_viewer_pose([0.0, 1.6, 0.0])));
            }
            let time = f64::from(tick) * scenario.frame_interval_ms as f64;
            if !session.tick(time) {
                warn!(tick, "no frame pending");
            }
            if scenario.select_on_tick == Some(tick)
                && let Some(controller) = controllers.first()
            {
                session.fire_input(SessionEventKind::Select, controller.clone());
            }
            tokio::time::sleep(interval).await;
        }
        bridge.request_exit();
    }

    let stats = heap.stats();
    info!(
        allocations = stats.allocations,
        outstanding = stats.outstanding,
        state = ?bridge.state(),
        "run complete"
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    lifecycle_task.abort();
    if let Err(error) = lifecycle_task.await
        && !error.is_cancelled()
    {
        warn!(%error, "lifecycle task stopped");
    }
    Ok(())
}
