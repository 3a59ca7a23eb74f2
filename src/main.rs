use anyhow::Context;
use log::*;

use otpvote::config::Config;
use otpvote::{build_app, dao, AppState};

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let config = Config::from_env()?;

    let db = match dao::create_pool(&config).await {
        Ok(db) => db,
        Err(err) => {
            error!("Could not initialize pool! {:?}", err);
            return Err(err.into());
        }
    };

    if config.run_migrations {
        dao::migrate(&db).await.context("running migrations")?;
        info!("database migrations applied");
    }

    let redis = redis::Client::open(config.redis_url.as_str()).context("parsing REDIS_URL")?;
    let bind_addr = config.bind_addr.clone();
    info!("OTP mode: {:?}", config.otp_mode);
    let state = AppState::new(config, db, redis);
    state
        .redis
        .run(|mut conn| async move { redis::cmd("PING").query_async::<_, String>(&mut conn).await })
        .await
        .context("pinging redis")?;
    info!("Connected to Redis");
    let app = build_app(state).map_err(tide::Error::into_inner)?;

    info!("listening on {}", bind_addr);
    app.listen(bind_addr).await?;
    Ok(())
}
