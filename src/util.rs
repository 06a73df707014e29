use std::net::Ipv4Addr;

use crate::config::parse_flag;

const HUB_PORT: &str = "HUB_PORT";

const DEFAULT_PORT: u16 = 51243;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HUB_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const HUB_ADDR: &str = "HUB_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> Ipv4Addr {
    let addr_from_env = std::env::var(HUB_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const HUB_SECRET: &str = "HUB_SECRET";

pub fn get_secret() -> Option<String> {
    let secret_from_env = std::env::var(HUB_SECRET);
    secret_from_env.ok()
}

const THRESHOLD_UTILISATION: &str = "THRESHOLD_UTILISATION";

pub fn get_threshold_override() -> Option<u8> {
    std::env::var(THRESHOLD_UTILISATION)
        .ok()
        .and_then(|res| res.trim().parse().ok())
}

const DESIRED_UTILISATION: &str = "DESIRED_UTILISATION";

pub fn get_desired_override() -> Option<u8> {
    std::env::var(DESIRED_UTILISATION)
        .ok()
        .and_then(|res| res.trim().parse().ok())
}

const ENABLE_NOTIFICATIONS: &str = "ENABLE_NOTIFICATIONS";

pub fn get_notifications_override() -> Option<bool> {
    std::env::var(ENABLE_NOTIFICATIONS)
        .ok()
        .and_then(|res| parse_flag(&res))
}

const NOTIFICATION_TOPIC: &str = "NOTIFICATION_TOPIC";

pub fn get_notification_topic_override() -> Option<String> {
    std::env::var(NOTIFICATION_TOPIC)
        .ok()
        .map(|res| res.trim().to_string())
        .filter(|topic| !topic.is_empty())
}
