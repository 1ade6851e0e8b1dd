use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::web;

use crate::{
    api::{attendance, employee, location, scan, ws},
    config::Config,
};

type LimiterConfig = GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>;

/// Limiter state shared by every worker.
#[derive(Clone)]
pub struct RateLimits {
    simulate: LimiterConfig,
    register: LimiterConfig,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            simulate: per_minute(config.rate_simulate_per_min),
            register: per_minute(config.rate_register_per_min),
        }
    }
}

fn per_minute(requests_per_min: u32) -> LimiterConfig {
    let requests_per_min = requests_per_min.max(1);
    GovernorConfigBuilder::default()
        .per_millisecond(60_000 / u64::from(requests_per_min))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default()
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimits) {
    cfg.service(
        web::scope(&config.api_prefix)
            .service(web::resource("/status").route(web::get().to(scan::status)))
            .service(web::resource("/events").route(web::get().to(scan::recent_events)))
            .service(
                web::resource("/simulate")
                    .wrap(Governor::new(&limits.simulate))
                    .route(web::post().to(scan::simulate_scan)),
            )
            .service(web::resource("/clear").route(web::post().to(scan::clear_events)))
            .service(web::resource("/active").route(web::get().to(attendance::active_sessions)))
            .service(web::resource("/logs").route(web::get().to(attendance::attendance_logs)))
            .service(web::resource("/stats").route(web::get().to(attendance::today_stats)))
            .service(
                web::scope("/employees")
                    // /employees
                    .service(web::resource("").route(web::get().to(employee::list_employees)))
                    // /employees/register
                    .service(
                        web::resource("/register")
                            .wrap(Governor::new(&limits.register))
                            .route(web::post().to(employee::register_employee)),
                    ),
            )
            .service(web::resource("/locations").route(web::get().to(location::list_locations))),
    );

    cfg.service(web::resource("/ws").route(web::get().to(ws::dashboard_socket)));
}
