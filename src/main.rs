use chrono::NaiveDate;
use clap::Parser;
use patron_portal::core::report::{self, OutputFormat};
use patron_portal::core::{checkouts, fines, payments, requests};
use patron_portal::utils::error::{ErrorSeverity, PortalError};
use patron_portal::utils::logger;
use patron_portal::{CliConfig, Command, Flash, PortalConfig, PortalService, Result, SortField, View};
use std::collections::HashMap;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting patron-portal CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    match run(&cli).await {
        Ok(Outcome { output, flash_alert }) => {
            println!("{}", output);
            if flash_alert {
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

struct Outcome {
    output: String,
    flash_alert: bool,
}

impl Outcome {
    fn text(output: String) -> Self {
        Self {
            output,
            flash_alert: false,
        }
    }

    fn flash(flash: &Flash, format: OutputFormat) -> Result<Self> {
        Ok(Self {
            output: report::render_flash(flash, format)?,
            flash_alert: flash.is_alert(),
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| PortalError::validation(format!("Invalid date (expected YYYY-MM-DD): {}", raw)))
}

async fn run(cli: &CliConfig) -> Result<Outcome> {
    let config = PortalConfig::from_file(&cli.config)?;
    let service = PortalService::from_config(&config)?;
    let format = cli.format;

    match &cli.command {
        Command::Login { library_id, pin } => Ok(Outcome::text(service.login(library_id, pin).await?)),
        Command::Summary { patron } => {
            let summary = service.summary(patron).await?;
            Ok(Outcome::text(report::render_summary(&summary, format)?))
        }
        Command::Checkouts { patron, view, sort } => {
            let rows = checkouts::list(&service, patron, view.parse::<View>()?, sort.parse::<SortField>()?).await?;
            Ok(Outcome::text(report::render(&rows, format)?))
        }
        Command::Renew { patron, item } => {
            Outcome::flash(&checkouts::renew(&service, patron, item).await?, format)
        }
        Command::RenewAll { patron } => {
            Outcome::flash(&checkouts::renew_all(&service, patron).await?, format)
        }
        Command::Requests { patron, view, sort } => {
            let rows = requests::list(&service, patron, view.parse::<View>()?, sort.parse::<SortField>()?).await?;
            Ok(Outcome::text(report::render(&rows, format)?))
        }
        Command::CancelRequest { patron, request } => {
            Outcome::flash(&requests::cancel(&service, patron, request).await?, format)
        }
        Command::UpdateRequest {
            patron,
            request,
            pickup,
            not_needed_after,
        } => {
            let date = not_needed_after.as_deref().map(parse_date).transpose()?;
            let flash = requests::update(&service, patron, request, pickup.as_deref(), date).await?;
            Outcome::flash(&flash, format)
        }
        Command::Fines { patron, view } => {
            let statement = fines::list(&service, patron, view.parse::<View>()?).await?;
            Ok(Outcome::text(report::render_statement(&statement, format)?))
        }
        Command::Pay { patron, view } => {
            let form = payments::start(&service, patron, view.parse::<View>()?).await?;
            Ok(Outcome::text(report::render_payment_form(&form, format)?))
        }
        Command::VerifyPayment { params } => {
            let content = std::fs::read_to_string(params)?;
            let fields: HashMap<String, String> = serde_json::from_str(&content)?;
            Outcome::flash(&payments::accept(&service, fields).await, format)
        }
    }
}
