// Command-line arguments

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[command(
    version,
    about = "Fetch CPU, memory and request stats from Prometheus and summarize them over a time window"
)]
pub struct CliArgs {
    /// Path to the TOML config file
    #[arg(long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Summarize one window and print the flat mapping as JSON
    Summary(SummaryArgs),
    /// Evaluate the configured threshold checks
    Check(PrometheusArgs),
    /// Summarize the trailing window on a schedule and store the results
    Collect(PrometheusArgs),
    /// Serve summaries and stored history over HTTP (runs the collector too)
    Serve(PrometheusArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct PrometheusArgs {
    /// Prometheus base URL (overrides the config file)
    #[arg(long)]
    pub url: Option<String>,

    /// Host header when collection is through an ingress
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SummaryArgs {
    /// Duration in seconds of the extract
    pub nseconds: i64,

    /// Relative time in seconds from now to end collection
    #[arg(long, default_value_t = 0)]
    pub end: i64,

    /// Absolute window start (epoch seconds); overrides --end
    #[arg(long)]
    pub start: Option<i64>,

    /// Pretty print JSON with this indent
    #[arg(long)]
    pub indent: Option<usize>,

    /// Report min/avg/max per group
    #[arg(long, action = ArgAction::SetTrue)]
    pub aggregate: bool,

    /// Report the full per-timestamp trend per group
    #[arg(long = "no-aggregate", action = ArgAction::SetTrue)]
    pub no_aggregate: bool,

    #[command(flatten)]
    pub prometheus: PrometheusArgs,
}

impl SummaryArgs {
    /// `None` leaves the config file's setting in place.
    pub fn aggregate_override(&self) -> Option<bool> {
        match (self.aggregate, self.no_aggregate) {
            (_, true) => Some(false),
            (true, false) => Some(true),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_parses_window_flags() {
        let args = CliArgs::try_parse_from([
            "meshperf",
            "summary",
            "600",
            "--end",
            "30",
            "--url",
            "http://prom:9090",
            "--host",
            "prom.example.com",
            "--no-aggregate",
        ])
        .unwrap();
        let Command::Summary(summary) = args.command else {
            panic!("expected summary subcommand");
        };
        assert_eq!(summary.nseconds, 600);
        assert_eq!(summary.end, 30);
        assert_eq!(summary.prometheus.url.as_deref(), Some("http://prom:9090"));
        assert_eq!(summary.prometheus.host.as_deref(), Some("prom.example.com"));
        assert_eq!(summary.aggregate_override(), Some(false));
    }

    #[test]
    fn summary_aggregate_defaults_to_config() {
        let args = CliArgs::try_parse_from(["meshperf", "summary", "60"]).unwrap();
        let Command::Summary(summary) = args.command else {
            panic!("expected summary subcommand");
        };
        assert_eq!(summary.aggregate_override(), None);
        assert_eq!(summary.end, 0);
    }

    #[test]
    fn serve_accepts_url() {
        let args =
            CliArgs::try_parse_from(["meshperf", "serve", "--url", "http://prom:9090"]).unwrap();
        assert!(matches!(args.command, Command::Serve(ref p) if p.url.is_some()));
    }
}
