use std::sync::Arc;

use clap::Parser;
use rocket::{
    Build, Rocket, State,
    figment::Figment,
    get,
    http::Status,
    post,
    request::{FromRequest, Outcome},
    routes,
};
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use volume_autoscaler::{
    config::read_config_file,
    provisioner::{ProvisionEvent, ProvisionSettings, Provisioner},
    resizer::{NotificationEnvelope, ResizeSettings, Resizer},
    services::Services,
    util::{get_addr, get_port, get_secret},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

/// Long lived orchestrators shared by every request
struct Hub {
    provisioner: Arc<Provisioner>,
    resizer: Arc<Resizer>,
}

#[get("/ping")]
fn ping() {}

#[post("/events/provision", data = "<body>")]
#[instrument(skip_all)]
async fn provision(_secret: SecretKey, hub: &State<Hub>, body: String) -> Status {
    let event: ProvisionEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("rejecting provision event: {e}");
            return Status::BadRequest;
        }
    };

    let provisioner = hub.provisioner.clone();
    tokio::spawn(async move {
        match provisioner.handle(&event).await {
            Ok(reports) => {
                let failed = reports.iter().filter(|report| report.result.is_err()).count();
                info!(
                    "provisioning of '{}' finished, {} target(s), {} failed",
                    event.instance_id,
                    reports.len(),
                    failed
                );
            }
            Err(e) => error!("could not resolve targets for '{}': {e}", event.instance_id),
        }
    });

    Status::Accepted
}

#[post("/events/alarm", data = "<body>")]
#[instrument(skip_all)]
async fn alarm(_secret: SecretKey, hub: &State<Hub>, body: String) -> Status {
    let envelope: NotificationEnvelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("rejecting alarm notification: {e}");
            return Status::BadRequest;
        }
    };

    let resizer = hub.resizer.clone();
    tokio::spawn(async move {
        let report = resizer.handle(&envelope).await;
        debug!("resize run ended with {:?}", report.outcome);
    });

    Status::Accepted
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("volume_autoscaler", LevelFilter::TRACE),
        ("autoscaler_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn get_config() -> Figment {
    rocket::Config::figment()
        .merge(("port", get_port()))
        .merge(("address", get_addr()))
}

fn build(figment: Figment, hub: Hub) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(hub)
        .mount("/", routes![ping, provision, alarm])
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let services = Services::from_config(&config)?;

    let hub = Hub {
        provisioner: Arc::new(Provisioner::new(
            services.clone(),
            &config.polling,
            ProvisionSettings::from_config(&config),
        )),
        resizer: Arc::new(Resizer::new(
            services,
            &config.polling,
            ResizeSettings::from_config(&config),
        )),
    };

    build(get_config(), hub)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("hub terminated: {e}"))?;

    Ok(())
}

#[derive(Debug)]
struct SecretKey;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SecretKey {
    type Error = ();

    async fn from_request(
        request: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, Self::Error> {
        let header = request.headers().get_one("X-AUTOSCALER-SECRET");
        let Some(secret) = get_secret() else {
            return Outcome::Success(SecretKey);
        };

        if let Some(passed_secret) = header
            && passed_secret == secret
        {
            Outcome::Success(SecretKey)
        } else {
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}
