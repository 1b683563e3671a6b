use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use irrigation_dashboard::api::save_export;
use irrigation_dashboard::console::{parse_command, render_view, Command, HELP};
use irrigation_dashboard::notification::EXPORT_FAILED;
use irrigation_dashboard::{
    ApiClient, Dashboard, DashboardConfig, DashboardContext, HubRegistry, Notifier, PushChannel,
    PushSink, SessionStore,
};
use irrigation_shared::api::{
    BikeRegistration, BusinessLine, CustomerRegistration, RiderRegistration, UserSession,
};
use irrigation_shared::format_alias;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "irrigation-dashboard")]
#[command(about = "Terminal dashboard for irrigation machines", long_about = None)]
struct Cli {
    /// REST base URL (overrides API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push channel base URL (overrides SOCKET_URL)
    #[arg(long, global = true)]
    socket_url: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Mount the live dashboard (default)
    Run(Credentials),
    /// Log in and store the session
    Login(Credentials),
    /// Forget the stored session
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// List machines known to the backend
    Machines,
    /// Add a bike to the fleet
    RegisterBike {
        #[arg(long)]
        plate: String,
        #[arg(long)]
        serial: String,
        /// 1 or 2
        #[arg(long, default_value = "1")]
        generation: u8,
    },
    /// Add a rider
    RegisterRider {
        #[arg(long)]
        fname: String,
        #[arg(long)]
        lname: String,
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Add a customer business
    RegisterCustomer(CustomerArgs),
    /// List registered businesses
    Businesses,
    /// Download every log entry for the session's machine
    Export,
}

#[derive(Args)]
struct CustomerArgs {
    /// transportation, logistic, food, warehouse, retail_store, beverage,
    /// electronics or agriculture
    #[arg(long)]
    business_line: BusinessLine,
    #[arg(long)]
    business_name: String,
    #[arg(long)]
    longitude: f64,
    #[arg(long)]
    latitude: f64,
    #[arg(long)]
    location: String,
    #[arg(long)]
    fname: String,
    #[arg(long)]
    lname: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
}

impl From<CustomerArgs> for CustomerRegistration {
    fn from(a: CustomerArgs) -> Self {
        CustomerRegistration {
            business_line: a.business_line,
            business_name: a.business_name,
            longitude: a.longitude,
            latitude: a.latitude,
            location: a.location,
            fname: a.fname,
            lname: a.lname,
            email: a.email,
            phone: a.phone,
        }
    }
}

#[derive(Args, Default)]
struct Credentials {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    machine: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut cfg = DashboardConfig::load()?;
    if let Some(url) = cli.api_url {
        cfg.api_url = url;
    }
    if let Some(url) = cli.socket_url {
        cfg.socket_url = Some(url);
    }

    let api = ApiClient::new(cfg.base_http());
    let store = SessionStore::new(cfg.session_path());

    match cli.command.unwrap_or(Cmd::Run(Credentials::default())) {
        Cmd::Run(creds) => {
            let session = session_for(&api, &store, creds).await?;
            run(&cfg, &api, &store, session).await
        }
        Cmd::Login(creds) => {
            if creds.email.is_none() {
                anyhow::bail!("--email, --password and --machine are required");
            }
            let session = session_for(&api, &store, creds)
                .await?
                .context("login returned no session")?;
            println!("logged in as {} on {}", session.email, session.machine_id);
            Ok(())
        }
        Cmd::Logout => {
            store.clear()?;
            println!("logged out");
            Ok(())
        }
        Cmd::Register {
            email,
            username,
            password,
        } => {
            let msg = api.register(&email, &username, &password).await?;
            println!("{msg}");
            Ok(())
        }
        Cmd::Machines => print_machines(&api).await,
        Cmd::RegisterBike {
            plate,
            serial,
            generation,
        } => {
            let bike = BikeRegistration {
                plate_no: plate,
                serial_no: serial,
                generation,
            };
            println!("{}", api.register_bike(&bike).await?);
            Ok(())
        }
        Cmd::RegisterRider {
            fname,
            lname,
            national_id,
            phone,
            location,
            email,
        } => {
            let rider = RiderRegistration {
                fname,
                lname,
                national_id,
                phone,
                location,
                email,
            };
            println!("{}", api.register_rider(&rider).await?);
            Ok(())
        }
        Cmd::RegisterCustomer(args) => {
            let msg = api.register_customer(&args.into()).await?;
            println!("{msg}");
            Ok(())
        }
        Cmd::Businesses => {
            for b in api.business_names().await? {
                println!("{:<8} {}", b.customer_id, b.business_name);
            }
            Ok(())
        }
        Cmd::Export => {
            let ctx = DashboardContext::require(store.load()?)?;
            let path = export(&cfg, &api, ctx.machine_id()).await?;
            println!("saved {}", path.display());
            Ok(())
        }
    }
}

/// Logs in when credentials are given, otherwise reuses the stored session.
async fn session_for(
    api: &ApiClient,
    store: &SessionStore,
    creds: Credentials,
) -> anyhow::Result<Option<UserSession>> {
    let Credentials {
        email: Some(email),
        password,
        machine,
    } = creds
    else {
        return Ok(store.load()?);
    };
    let password = password.context("--password is required with --email")?;
    let machine = machine.context("--machine is required with --email")?;

    let session = api.login(&email, &password, &machine).await?;
    store.save(&session)?;
    Ok(Some(session))
}

async fn print_machines(api: &ApiClient) -> anyhow::Result<()> {
    let machines = api.machine_names().await?;
    for (i, m) in machines.iter().enumerate() {
        let alias = format_alias(&(i + 1).to_string(), 3, "MC");
        println!("{alias}  {:<12} {}", m.machine_id, m.name);
    }
    Ok(())
}

async fn export(
    cfg: &DashboardConfig,
    api: &ApiClient,
    machine_id: &str,
) -> anyhow::Result<PathBuf> {
    let export = api.export_all(machine_id).await?;
    Ok(save_export(&cfg.export_dir, &export)?)
}

async fn run(
    cfg: &DashboardConfig,
    api: &ApiClient,
    store: &SessionStore,
    session: Option<UserSession>,
) -> anyhow::Result<()> {
    let mut hubs = HubRegistry::default();
    let ctx = DashboardContext::require(session)?.with_hub(&mut hubs);
    if let Some(hub) = &ctx.hub {
        log::info!("hub {}", hub.region_name);
    }

    let push = PushChannel::connect(cfg.push_url());
    if !push.wait_connected(Duration::from_secs(5)).await {
        log::warn!("push channel not connected yet, live data will start when it is");
    }

    let notifier = Notifier::default();
    let mut toasts = notifier.subscribe();
    let _toasts = tokio::spawn(async move {
        while let Ok(n) = toasts.recv().await {
            eprintln!("[{}] {}", n.title, n.description);
        }
    });

    let sink = PushSink::new(push.emitter(), ctx.machine_id());
    let dash = Dashboard::mount(&ctx, api, &push, &notifier, sink, cfg.debounce()).await;

    let mut view = dash.watch();
    let _printer = tokio::spawn(async move {
        loop {
            let text = render_view(&view.borrow_and_update());
            println!("{text}");
            if view.changed().await.is_err() {
                break;
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match cmd {
            Command::Temperature(v) => dash.set_target_temperature(v),
            Command::Humidity(v) => dash.set_target_humidity(v),
            Command::Toggle(actuator, on) => dash.set_actuator(actuator, on),
            Command::Export => match export(cfg, api, ctx.machine_id()).await {
                Ok(path) => notifier.info("Export", format!("saved {}", path.display())),
                Err(e) => {
                    log::warn!("export failed: {e:#}");
                    notifier.error(EXPORT_FAILED);
                }
            },
            Command::Machines => {
                if let Err(e) = print_machines(api).await {
                    eprintln!("{e:#}");
                }
            }
            Command::Logout => {
                store.clear()?;
                println!("logged out");
                break;
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    dash.unmount();
    push.disconnect();
    Ok(())
}
