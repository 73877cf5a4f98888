//! Command surface for the booking ledger.
//!
//! Hosts embed the CLI through [`run_cli`] after parsing a [`Cli`]. The JSON
//! payloads printed with `--json` are versioned (`appointments.v1`,
//! `clients.v1`, `time_window.v1`) and validated against the schemas under
//! `contracts/v1/`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use booking_ledger_core::{
    build_client_book, classify_appointments, days_since, filter_by_engagement, filter_by_status,
    format_rfc3339, parse_rfc3339_utc, parse_time_window, Appointment, BookingRow,
    ClassificationRuleset, ClientEngagement, DerivedStatus, EngagementStatus, EngagementSummary,
    ParsedWindow, StatusSummary,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "bk")]
#[command(about = "Booking ledger CLI")]
pub struct Cli {
    /// Evaluation instant (RFC3339, UTC). Required by classification commands.
    #[arg(long, global = true)]
    now: Option<String>,

    /// Path to a classification ruleset JSON file. Defaults to ruleset v1.
    #[arg(long, global = true)]
    ruleset: Option<PathBuf>,

    /// Tracing filter directive, e.g. `debug` or `booking_ledger_core=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Appointments {
        #[command(subcommand)]
        command: AppointmentsCommand,
    },
    Clients {
        #[command(subcommand)]
        command: ClientsCommand,
    },
    Time {
        #[command(subcommand)]
        command: TimeCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum AppointmentsCommand {
    Classify(ClassifyArgs),
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    status: Option<StatusArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum ClientsCommand {
    Resolve(ResolveArgs),
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    engagement: Option<EngagementArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum TimeCommand {
    Parse(TimeParseArgs),
}

#[derive(Debug, Args)]
pub struct TimeParseArgs {
    text: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Scheduled,
    Completed,
    PendingNotes,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngagementArg {
    Active,
    Inactive,
    DropOut,
}

/// Installs the stderr tracing subscriber.
///
/// An explicit `--log-level` wins over `RUST_LOG`; an invalid directive falls
/// back to `warn`. Repeated calls are ignored.
pub fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
        }
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when the ruleset or input file cannot be loaded, when
/// `--now` is missing or not a UTC RFC3339 timestamp, or when output cannot
/// be serialized.
pub fn run_cli(cli: Cli) -> Result<()> {
    let ruleset = load_ruleset(cli.ruleset.as_deref())?;
    match cli.command {
        Command::Appointments { command } => {
            let now = require_now(cli.now.as_deref())?;
            run_appointments(command, now, &ruleset)
        }
        Command::Clients { command } => {
            let now = require_now(cli.now.as_deref())?;
            run_clients(command, now, &ruleset)
        }
        Command::Time { command } => run_time(command, &ruleset),
    }
}

fn run_appointments(
    command: AppointmentsCommand,
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
) -> Result<()> {
    match command {
        AppointmentsCommand::Classify(args) => {
            let rows = load_booking_rows(&args.input)?;
            let appointments = classify_appointments(&rows, now, ruleset);
            let status = args.status.map(map_status);
            tracing::info!(
                rows = rows.len(),
                filter = status.map(DerivedStatus::as_str),
                "classified appointments"
            );

            let payload = build_appointments_json_payload(now, ruleset, status, &appointments)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_appointments_table(&payload);
            }
            Ok(())
        }
    }
}

fn run_clients(
    command: ClientsCommand,
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
) -> Result<()> {
    match command {
        ClientsCommand::Resolve(args) => {
            let rows = load_booking_rows(&args.input)?;
            let clients = build_client_book(&rows, now, ruleset);
            let engagement = args.engagement.map(map_engagement);
            tracing::info!(
                rows = rows.len(),
                clients = clients.len(),
                filter = engagement.map(EngagementStatus::as_str),
                "resolved clients"
            );

            let payload = build_clients_json_payload(now, ruleset, engagement, &clients)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_clients_table(&payload, now);
            }
            Ok(())
        }
    }
}

fn run_time(command: TimeCommand, ruleset: &ClassificationRuleset) -> Result<()> {
    match command {
        TimeCommand::Parse(args) => {
            let payload = build_time_window_json_payload(&args.text, ruleset);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_time_window(&payload);
            }
            Ok(())
        }
    }
}

fn require_now(raw: Option<&str>) -> Result<OffsetDateTime> {
    let Some(raw) = raw else {
        return Err(anyhow!(
            "--now <RFC3339 UTC timestamp> is required for classification commands"
        ));
    };
    parse_rfc3339_utc(raw).map_err(|err| anyhow!("invalid --now value: {err}"))
}

/// Loads a ruleset file, or ruleset v1 when no path is given.
///
/// # Errors
/// Returns an error when the file cannot be read, is not JSON, or fails
/// ruleset validation.
pub fn load_ruleset(path: Option<&Path>) -> Result<ClassificationRuleset> {
    let Some(path) = path else {
        return Ok(ClassificationRuleset::v1());
    };
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading ruleset from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("ruleset {} must be valid JSON", path.display()))?;
    ClassificationRuleset::from_json(&value).map_err(|err| anyhow!(err.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BookingFeed {
    Rows(Vec<BookingRow>),
    Envelope { data: Vec<BookingRow> },
}

/// Reads booking rows from a JSON file holding either an array of rows or a
/// `{"data": [...]}` envelope.
///
/// # Errors
/// Returns an error when the file cannot be read or matches neither shape.
pub fn load_booking_rows(path: &Path) -> Result<Vec<BookingRow>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading booking rows from {}", path.display()))?;
    let feed: BookingFeed = serde_json::from_str(&body).with_context(|| {
        format!(
            "{} must hold a JSON array of booking rows or an object with a `data` array",
            path.display()
        )
    })?;
    Ok(match feed {
        BookingFeed::Rows(rows) | BookingFeed::Envelope { data: rows } => rows,
    })
}

fn map_status(value: StatusArg) -> DerivedStatus {
    match value {
        StatusArg::Scheduled => DerivedStatus::Scheduled,
        StatusArg::Completed => DerivedStatus::Completed,
        StatusArg::PendingNotes => DerivedStatus::PendingNotes,
        StatusArg::Cancelled => DerivedStatus::Cancelled,
        StatusArg::NoShow => DerivedStatus::NoShow,
    }
}

fn map_engagement(value: EngagementArg) -> EngagementStatus {
    match value {
        EngagementArg::Active => EngagementStatus::Active,
        EngagementArg::Inactive => EngagementStatus::Inactive,
        EngagementArg::DropOut => EngagementStatus::DropOut,
    }
}

fn display_time(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|value| format_rfc3339(value).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn print_appointments_table(payload: &AppointmentsJsonPayload) {
    println!(
        "now={} ruleset={} filter={}",
        payload.now,
        payload.ruleset_version,
        payload.status_filter.map_or("none", DerivedStatus::as_str)
    );
    println!(
        "{:<16} {:<14} {:<10} {:<21} {:<21} {:<16} time_text",
        "id", "status", "raw", "start", "end", "host"
    );
    println!("{}", "-".repeat(120));
    for item in &payload.appointments {
        println!(
            "{:<16} {:<14} {:<10} {:<21} {:<21} {:<16} {}",
            item.id,
            item.derived_status.as_str(),
            item.raw_status.as_str(),
            display_time(item.start_at),
            display_time(item.end_at),
            item.host_name.as_deref().unwrap_or("-"),
            item.raw_time_text
        );
    }

    let summary = &payload.summary;
    println!(
        "total={} scheduled={} completed={} pending_notes={} cancelled={} no_show={} unparsed_time={}",
        summary.total,
        summary.scheduled,
        summary.completed,
        summary.pending_notes,
        summary.cancelled,
        summary.no_show,
        summary.unparsed_time
    );
}

fn print_clients_table(payload: &ClientsJsonPayload, now: OffsetDateTime) {
    println!(
        "now={} ruleset={} filter={}",
        payload.now,
        payload.ruleset_version,
        payload.engagement_filter.map_or("none", EngagementStatus::as_str)
    );
    println!(
        "{:<10} {:<24} {:<10} {:<6} {:<28} {:<18} days_since_visit",
        "client", "name", "engagement", "appts", "email", "phone"
    );
    println!("{}", "-".repeat(120));
    for item in &payload.clients {
        let days = item
            .last_visit_at
            .map_or_else(|| "-".to_string(), |visit| format!("{:.1}", days_since(visit, now)));
        println!(
            "{:<10} {:<24} {:<10} {:<6} {:<28} {:<18} {}",
            item.client.id.to_string(),
            item.client.name,
            item.engagement.as_str(),
            item.client.appointments.len(),
            item.client.primary_email().unwrap_or("-"),
            item.client.primary_phone().unwrap_or("-"),
            days
        );
    }

    let summary = &payload.summary;
    println!(
        "total={} active={} inactive={} drop_out={}",
        summary.total, summary.active, summary.inactive, summary.drop_out
    );
}

fn print_time_window(payload: &TimeWindowJsonPayload) {
    match &payload.result {
        ParsedWindow::Window(window) => println!(
            "start={} end={}",
            display_time(Some(window.start)),
            display_time(Some(window.end))
        ),
        ParsedWindow::Unparsed { reason } => println!("unparsed reason={}", reason.as_str()),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AppointmentsJsonPayload {
    contract_version: String,
    now: String,
    ruleset_version: u32,
    status_filter: Option<DerivedStatus>,
    summary: StatusSummary,
    appointments: Vec<Appointment>,
}

/// Builds the `appointments.v1` payload. The summary always covers every
/// input row; `status_filter` only narrows the listed appointments.
///
/// # Errors
/// Returns an error when `now` cannot be formatted.
pub fn build_appointments_json_payload(
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
    status_filter: Option<DerivedStatus>,
    appointments: &[Appointment],
) -> Result<AppointmentsJsonPayload> {
    Ok(AppointmentsJsonPayload {
        contract_version: "appointments.v1".to_string(),
        now: format_rfc3339(now).map_err(|err| anyhow!(err.to_string()))?,
        ruleset_version: ruleset.ruleset_version,
        status_filter,
        summary: StatusSummary::from_appointments(appointments),
        appointments: match status_filter {
            Some(status) => filter_by_status(appointments, status),
            None => appointments.to_vec(),
        },
    })
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientsJsonPayload {
    contract_version: String,
    now: String,
    ruleset_version: u32,
    engagement_filter: Option<EngagementStatus>,
    summary: EngagementSummary,
    clients: Vec<ClientEngagement>,
}

/// Builds the `clients.v1` payload. The summary always covers every resolved
/// client; `engagement_filter` only narrows the listed clients.
///
/// # Errors
/// Returns an error when `now` cannot be formatted.
pub fn build_clients_json_payload(
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
    engagement_filter: Option<EngagementStatus>,
    clients: &[ClientEngagement],
) -> Result<ClientsJsonPayload> {
    Ok(ClientsJsonPayload {
        contract_version: "clients.v1".to_string(),
        now: format_rfc3339(now).map_err(|err| anyhow!(err.to_string()))?,
        ruleset_version: ruleset.ruleset_version,
        engagement_filter,
        summary: EngagementSummary::from_clients(clients),
        clients: match engagement_filter {
            Some(engagement) => filter_by_engagement(clients, engagement),
            None => clients.to_vec(),
        },
    })
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeWindowJsonPayload {
    contract_version: String,
    input: String,
    default_utc_offset_minutes: i16,
    result: ParsedWindow,
}

#[must_use]
pub fn build_time_window_json_payload(
    text: &str,
    ruleset: &ClassificationRuleset,
) -> TimeWindowJsonPayload {
    TimeWindowJsonPayload {
        contract_version: "time_window.v1".to_string(),
        input: text.to_string(),
        default_utc_offset_minutes: ruleset.default_utc_offset_minutes,
        result: parse_time_window(text, ruleset.default_offset()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use ulid::Ulid;

    const NOW: &str = "2024-03-01T06:30:00Z";

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn now() -> OffsetDateTime {
        must(parse_rfc3339_utc(NOW).map_err(|err| anyhow!(err.to_string())))
    }

    fn fixture_rows() -> Vec<BookingRow> {
        must(
            serde_json::from_value(json!([
                {
                    "booking_id": "b-1",
                    "invitee_name": "Asha Kumar",
                    "invitee_email": "asha@clinic.io",
                    "booking_start_at": "Thursday, February 22, 2024 at 10:00 AM - 11:00 AM IST",
                    "has_session_notes": true
                },
                {
                    "booking_id": "b-2",
                    "invitee_name": "Asha",
                    "invitee_email": "Asha@Clinic.io",
                    "booking_start_at": "Monday, February 26, 2024 at 10:00 AM - 11:00 AM IST"
                },
                {
                    "booking_id": "b-3",
                    "invitee_name": "Ravi",
                    "invitee_phone": "98450 11223",
                    "booking_start_at": "Tuesday, January 2, 2024 at 5:00 PM - 6:00 PM IST",
                    "booking_status": "cancelled"
                }
            ]))
            .map_err(Into::into),
        )
    }

    fn write_temp_json(prefix: &str, value: &serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{prefix}-{}.json", Ulid::new()));
        must(fs::write(&path, value.to_string()).map_err(Into::into));
        path
    }

    fn execute_cli(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args)?;
        run_cli(cli)
    }

    #[test]
    fn require_now_rejects_missing_and_non_utc() {
        assert!(require_now(None).is_err());
        assert!(require_now(Some("2024-03-01T12:00:00+05:30")).is_err());
        assert_eq!(must(require_now(Some(NOW))), now());
    }

    #[test]
    fn load_booking_rows_accepts_array_and_envelope() {
        let rows = json!([{ "invitee_name": "Asha" }]);
        let array_path = write_temp_json("bk-rows-array", &rows);
        let envelope_path = write_temp_json("bk-rows-envelope", &json!({ "data": rows }));

        assert_eq!(must(load_booking_rows(&array_path)).len(), 1);
        assert_eq!(must(load_booking_rows(&envelope_path))[0].invitee_name, "Asha");

        let bad_path = write_temp_json("bk-rows-bad", &json!({ "rows": [] }));
        assert!(load_booking_rows(&bad_path).is_err());

        for path in [array_path, envelope_path, bad_path] {
            let _ = fs::remove_file(path);
        }
    }

    #[test]
    fn load_ruleset_defaults_to_v1_and_validates_files() {
        assert_eq!(must(load_ruleset(None)), ClassificationRuleset::v1());

        let path = write_temp_json(
            "bk-ruleset",
            &json!({
                "ruleset_version": 2,
                "engagement_window_days": 0,
                "default_utc_offset_minutes": 0
            }),
        );
        assert!(load_ruleset(Some(&path)).is_err());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn appointments_json_contract_is_stable_v1() {
        let ruleset = ClassificationRuleset::v1();
        let appointments = classify_appointments(&fixture_rows(), now(), &ruleset);
        let payload = must(build_appointments_json_payload(
            now(),
            &ruleset,
            Some(DerivedStatus::PendingNotes),
            &appointments,
        ));

        let value = must(serde_json::to_value(payload).map_err(Into::into));
        assert_eq!(
            value,
            json!({
                "contract_version": "appointments.v1",
                "now": "2024-03-01T06:30:00Z",
                "ruleset_version": 1,
                "status_filter": "pending_notes",
                "summary": {
                    "total": 3,
                    "scheduled": 0,
                    "completed": 1,
                    "pending_notes": 1,
                    "cancelled": 1,
                    "no_show": 0,
                    "unparsed_time": 0
                },
                "appointments": [
                    {
                        "id": "b-2",
                        "raw_status": "confirmed",
                        "has_session_notes": false,
                        "raw_time_text": "Monday, February 26, 2024 at 10:00 AM - 11:00 AM IST",
                        "start_at": "2024-02-26T10:00:00+05:30",
                        "end_at": "2024-02-26T11:00:00+05:30",
                        "derived_status": "pending_notes",
                        "host_name": null,
                        "resource_name": null
                    }
                ]
            })
        );
    }

    #[test]
    fn clients_payload_filters_list_but_not_summary() {
        let ruleset = ClassificationRuleset::v1();
        let clients = build_client_book(&fixture_rows(), now(), &ruleset);
        let payload = must(build_clients_json_payload(
            now(),
            &ruleset,
            Some(EngagementStatus::Inactive),
            &clients,
        ));

        let value = must(serde_json::to_value(payload).map_err(Into::into));
        assert_eq!(value["contract_version"], json!("clients.v1"));
        assert_eq!(
            value["summary"],
            json!({ "total": 2, "active": 1, "inactive": 1, "drop_out": 0 })
        );
        assert_eq!(value["clients"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["clients"][0]["name"], json!("Ravi"));
        assert_eq!(value["clients"][0]["last_visit_at"], json!(null));
    }

    #[test]
    fn time_window_payload_reports_reason() {
        let ruleset = ClassificationRuleset::v1();
        let value = must(
            serde_json::to_value(build_time_window_json_payload("soon", &ruleset))
                .map_err(Into::into),
        );
        assert_eq!(
            value,
            json!({
                "contract_version": "time_window.v1",
                "input": "soon",
                "default_utc_offset_minutes": 330,
                "result": { "outcome": "unparsed", "reason": "no_match" }
            })
        );
    }

    #[test]
    fn cli_end_to_end_classify_resolve_and_parse() {
        let input = write_temp_json(
            "bk-cli-e2e",
            &must(serde_json::to_value(fixture_rows()).map_err(Into::into)),
        );
        let input_str = match input.to_str() {
            Some(value) => value.to_string(),
            None => panic!("temp input path must be valid UTF-8"),
        };

        must(execute_cli(&[
            "bk",
            "--now",
            NOW,
            "appointments",
            "classify",
            "--input",
            &input_str,
            "--json",
        ]));
        must(execute_cli(&[
            "bk",
            "clients",
            "resolve",
            "--input",
            &input_str,
            "--engagement",
            "active",
            "--now",
            NOW,
        ]));
        must(execute_cli(&[
            "bk",
            "time",
            "parse",
            "Monday, January 15, 2024 at 9:00 AM - 10:00 AM",
        ]));

        let missing_now = execute_cli(&["bk", "clients", "resolve", "--input", &input_str]);
        assert!(missing_now.is_err());

        let _ = fs::remove_file(&input);
    }
}
