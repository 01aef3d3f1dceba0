use moex_data::{
    CandleInterval, MoexClient, MoexConfig, TraderClass, date_range,
    merge::MergeStats,
    signal::{
        PositionSeries, SessionWindow, divergence, position_axis_domain, relative_volume_at,
    },
};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    let ticker = std::env::args().nth(1).unwrap_or_else(|| "SiH6".to_string());

    let client = match MoexClient::new(MoexConfig::from_env()) {
        Ok(client) => client,
        Err(error) => {
            warn!(%error, "failed to construct ISS client");
            return;
        }
    };

    let merged = match client.get_merged_candles(&ticker, 14).await {
        Ok(merged) => merged,
        Err(error) => {
            warn!(%error, "invalid request");
            return;
        }
    };

    if !merged.completed {
        warn!(diagnostics = ?merged.diagnostics, "merged series is partial");
    }

    let stats = MergeStats::of(&merged.data);
    let domain = position_axis_domain(
        &merged.data,
        &[
            PositionSeries::Net(TraderClass::Institutional),
            PositionSeries::Net(TraderClass::Retail),
        ],
    );

    info!(
        %ticker,
        points = stats.total,
        priced = stats.priced,
        divergence = %divergence(&merged.data),
        ?domain,
        "merged candles"
    );

    // Full hourly series, the merged points only carry bars matched to a snapshot
    let range = date_range(14);
    let bars = match client
        .get_futures_candles(&ticker, range.from, range.till, CandleInterval::Hour1)
        .await
    {
        Ok(bars) => bars,
        Err(error) => {
            warn!(%error, "invalid request");
            return;
        }
    };
    if !bars.completed {
        warn!(diagnostics = ?bars.diagnostics, "candle series is partial");
    }

    // Exchange local time, MSK is UTC+3 year round
    let now = chrono::Utc::now().naive_utc() + chrono::TimeDelta::hours(3);
    let rvol = relative_volume_at(&bars.data, now, &SessionWindow::default());
    info!(?rvol, level = ?rvol.level(), "relative volume");
}

// Initialise an INFO `Subscriber` for `Tracing` Json logs and install it as the global default.
fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Disable colours on release builds
        .with_ansi(cfg!(debug_assertions))
        // Enable Json formatting
        .json()
        // Install this Tracing subscriber as global default
        .init()
}
