use chrono::{DateTime, Local, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::{error::Error as _, io, process};
use tesla_cron::{
    Config, Error, Tesla, logging,
    planner::{self, ChargeDecision},
    prices, session,
};
use tracing::warn;

#[derive(Parser)]
#[command(name = "tesla-cron")]
#[command(about = "Charge a Tesla in the cheapest hours before a deadline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Account {
    /// Account e-mail the session is cached under
    #[arg(long, env = "TESLA_EMAIL")]
    email: String,
}

#[derive(Args)]
struct Target {
    #[command(flatten)]
    account: Account,

    /// Vehicle identification number
    vin: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask for e-mail (and a refresh token if needed), then print the first vehicle
    Session,

    /// Ask for e-mail and an SSO refresh token and store a new session
    Login,

    /// Discard the cached session
    Logout(Account),

    /// List the vehicles of the account
    Vehicles(Account),

    /// Show charge and location data of a vehicle
    Data(Target),

    /// Wake a vehicle and wait until it is online
    Wake(Target),

    /// Start charging
    ChargeStart(Target),

    /// Stop charging
    ChargeStop(Target),

    /// Set the charge limit in percent
    ChargeLimit {
        #[command(flatten)]
        target: Target,
        percent: u8,
    },

    /// Configure scheduled charging or departure
    Schedule {
        #[command(flatten)]
        target: Target,
        #[command(subcommand)]
        mode: ScheduleMode,
    },

    /// Show upcoming spot prices
    Prices,

    /// Start charging if the cheapest hours before the deadline have begun
    Charge {
        #[command(flatten)]
        target: Target,

        /// When charging must be done (RFC 3339). Defaults to 48 hours from now.
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,

        /// Decide, but don't send the charge command
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ScheduleMode {
    /// Start charging at a fixed time
    Charging {
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        departure: DateTime<Utc>,
    },

    /// Depart at a fixed time, charging off-peak until `end_off_peak`
    Departure {
        #[arg(long)]
        end_off_peak: DateTime<Utc>,
        #[arg(long)]
        departure: DateTime<Utc>,
        /// Precondition the cabin before departure
        #[arg(long)]
        preheat: bool,
    },

    /// Turn off scheduled charging and departure
    Disable,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let cli = Cli::parse();
    logging::init();

    let result = match Config::from_env() {
        Ok(config) => run(cli.command.unwrap_or(Commands::Session), config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        process::exit(1);
    }
}

async fn run(command: Commands, config: Config) -> Result<(), Error> {
    match command {
        Commands::Session => {
            session::run(config, &mut io::stdin().lock(), &mut io::stdout()).await?;
        }
        Commands::Login => {
            let tesla =
                session::login(config, &mut io::stdin().lock(), &mut io::stdout(), true).await?;
            eprintln!("Login successful for {}", tesla.email());
        }
        Commands::Logout(account) => {
            let mut tesla = Tesla::open(account.email, config)?;
            if tesla.logout()? {
                eprintln!("Logout successful!");
            } else {
                eprintln!("No session cached for {}", tesla.email());
            }
        }
        Commands::Vehicles(account) => {
            let mut tesla = Tesla::open(account.email, config)?;
            for vehicle in tesla.vehicle_list().await? {
                println!(
                    "{}  {:<20} {}",
                    vehicle.vin,
                    vehicle.display_name.as_deref().unwrap_or("-"),
                    vehicle.state
                );
            }
        }
        Commands::Data(target) => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            let data = tesla.vehicle_data(&target.vin).await?;
            print_vehicle_data(&data);
            if let Some(location) = data.location() {
                println!("location: {:.5}, {:.5}", location.lat, location.lon);
            }
        }
        Commands::Wake(target) => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            tesla.wake_up(&target.vin).await?;
            println!("{} is online", target.vin);
        }
        Commands::ChargeStart(target) => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            tesla.charge_start(&target.vin).await?;
        }
        Commands::ChargeStop(target) => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            tesla.charge_stop(&target.vin).await?;
        }
        Commands::ChargeLimit { target, percent } => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            tesla.set_charge_limit(&target.vin, percent).await?;
        }
        Commands::Schedule { target, mode } => {
            let mut tesla = Tesla::open(target.account.email, config)?;
            let vin = &target.vin;
            match mode {
                ScheduleMode::Charging { start, departure } => {
                    tesla.scheduled_charging(vin, start, departure, &Local).await?
                }
                ScheduleMode::Departure {
                    end_off_peak,
                    departure,
                    preheat,
                } => {
                    tesla
                        .scheduled_departure(vin, end_off_peak, departure, preheat, &Local)
                        .await?
                }
                ScheduleMode::Disable => {
                    let now = Utc::now();
                    tesla.scheduled_disable(vin, now, now, &Local).await?
                }
            }
        }
        Commands::Prices => {
            let prices = prices::fetch(&config, Utc::now()).await?;
            println!("Spot prices:");
            for entry in &prices {
                println!("{}: {}", entry.time.with_timezone(&Local), entry.price);
            }
            if let Some((min, max)) = prices::min_max(&prices) {
                println!("min: {}  max: {}", min.price, max.price);
            }
        }
        Commands::Charge {
            target,
            deadline,
            dry_run,
        } => charge(config, target, deadline, dry_run).await?,
    }

    Ok(())
}

async fn charge(
    config: Config,
    target: Target,
    deadline: Option<DateTime<Utc>>,
    dry_run: bool,
) -> Result<(), Error> {
    let now = Utc::now();
    let deadline = deadline.unwrap_or(now + TimeDelta::hours(48));
    let vin = target.vin;

    // Without prices the charge is simply placed right before the deadline
    let prices = match prices::fetch(&config, now).await {
        Ok(prices) => prices,
        Err(e) => {
            warn!(error = %e, "planning without spot prices");
            Vec::new()
        }
    };
    if let Some((min, max)) = prices::min_max(&prices) {
        println!("min: {}  max: {}", min.price, max.price);
    }

    println!("--- {vin} ---");
    println!("Deadline: {}", deadline.with_timezone(&Local));

    let potential = planner::potential_start(&prices, deadline);
    println!("Potential start: {}", potential.with_timezone(&Local));
    if potential > now {
        println!("Wait...");
        return Ok(());
    }

    let mut tesla = Tesla::open(target.account.email, config)?;
    println!("Wake up vehicle...");
    tesla.wake_up(&vin).await?;
    let data = tesla.vehicle_data(&vin).await?;
    print_vehicle_data(&data);

    match planner::decide(&prices, &data.charge_state, deadline, Utc::now()) {
        ChargeDecision::NoNeed => println!("No need to charge"),
        ChargeDecision::AlreadyCharging => println!("Already charging"),
        ChargeDecision::Disconnected => println!("Disconnected"),
        ChargeDecision::Wait { start } => {
            println!("Start: {}", start.with_timezone(&Local));
            println!("Wait...");
        }
        ChargeDecision::StartNow { hours } => {
            println!("Charge hours: {hours}");
            if dry_run {
                println!("Dry run, not starting charge");
            } else {
                println!("Start charge now");
                tesla.charge_start(&vin).await?;
            }
        }
    }

    Ok(())
}

fn print_vehicle_data(data: &tesla_cron::VehicleData) {
    println!("vin:      {}", data.vin);
    println!("limit:    {}", data.charge_state.charge_limit_soc);
    println!("level:    {}", data.charge_state.battery_level);
    println!("state:    {}", data.charge_state.charging_state);
}
