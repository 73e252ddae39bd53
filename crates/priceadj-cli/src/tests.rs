use super::*;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["priceadj-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["priceadj-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["priceadj-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn run_defaults_to_today_and_a_real_run() {
    let cli = Cli::try_parse_from(["priceadj-cli", "run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run {
            date: None,
            dry_run: false
        })
    ));
}

#[test]
fn run_accepts_date_and_dry_run() {
    let cli =
        Cli::try_parse_from(["priceadj-cli", "run", "--date", "2024-07-15", "--dry-run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run {
            date: Some(d),
            dry_run: true
        }) if d == NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    ));
}

#[test]
fn run_rejects_malformed_date() {
    assert!(Cli::try_parse_from(["priceadj-cli", "run", "--date", "15/07/2024"]).is_err());
}

#[test]
fn sessions_list_hides_completed_by_default() {
    let cli = Cli::try_parse_from(["priceadj-cli", "sessions", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionsCommands::List { all: false }
        })
    ));
}

#[test]
fn sessions_franchisees_takes_a_session_id() {
    let cli = Cli::try_parse_from(["priceadj-cli", "sessions", "franchisees", "7"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionsCommands::Franchisees { session: 7 }
        })
    ));
}

#[test]
fn report_weekly_prints_unless_send_is_given() {
    let cli = Cli::try_parse_from(["priceadj-cli", "report", "weekly"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Report {
            command: ReportCommands::Weekly {
                date: None,
                send: false
            }
        })
    ));

    let cli = Cli::try_parse_from(["priceadj-cli", "report", "weekly", "--send"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Report {
            command: ReportCommands::Weekly { send: true, .. }
        })
    ));
}
