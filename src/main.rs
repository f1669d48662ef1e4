use anyhow::Context;
use perfrisk::config::load_config;
use perfrisk::data::synthetic_universe;
use perfrisk::engine::keys;
use perfrisk::engine::EngineInput;
use perfrisk::engine::MetricValue;
use perfrisk::AnalyticsConfig;
use perfrisk::AnalyticsEngine;
use prettytable::row;
use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use tracing_subscriber::EnvFilter;

const ROWS: [&str; 12] = [
  keys::ANNUALIZED_RETURN,
  keys::ANNUALIZED_VOLATILITY,
  keys::MAX_DRAWDOWN,
  keys::DOWNSIDE_DEVIATION,
  keys::SHARPE_RATIO,
  keys::SORTINO_RATIO,
  keys::CALMAR_RATIO,
  keys::INFORMATION_RATIO,
  keys::TREYNOR_RATIO,
  keys::ANNUALIZED_ALPHA,
  keys::BETA,
  keys::R_SQUARED,
];

fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let config = match std::env::args().nth(1) {
    Some(path) => load_config(&path).with_context(|| format!("loading {path}"))?,
    None => AnalyticsConfig::default(),
  };

  let universe = synthetic_universe(5, 120, 7)?;
  let input = EngineInput::new(universe.assets, universe.benchmark, universe.weights);
  let engine = AnalyticsEngine::new(config)?;
  let reports = engine.run(&input)?;

  let mut table = Table::new();
  let mut header = vec![Cell::new("metric")];
  header.extend(reports.iter().map(|r| Cell::new(&r.window.label)));
  table.set_titles(Row::new(header));

  for key in ROWS {
    let mut cells = vec![Cell::new(key)];
    cells.extend(reports.iter().map(|r| {
      let text = match r.metric(key) {
        Some(MetricValue::Value(v)) => format!("{v:.4}"),
        Some(MetricValue::Undefined { .. }) => "undefined".to_string(),
        None => "-".to_string(),
      };
      Cell::new(&text)
    }));
    table.add_row(Row::new(cells));
  }
  table.printstd();

  for report in &reports {
    if let Some(frontier) = &report.frontier {
      let mut t = Table::new();
      t.set_titles(row!["target", "return", "volatility"]);
      for p in frontier.points.iter().step_by(10) {
        t.add_row(row![
          format!("{:.4}", p.target_return),
          format!("{:.4}", p.expected_return),
          format!("{:.4}", p.volatility())
        ]);
      }
      println!(
        "\nfrontier [{}]: {} points, {} skipped, regularized = {}",
        report.window.label,
        frontier.points.len(),
        frontier.skipped.len(),
        frontier.regularized
      );
      t.printstd();
    } else {
      println!("\n[{}] {:?}", report.window.label, report.status);
    }
  }

  Ok(())
}
