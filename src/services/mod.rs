pub mod credentials_service;
pub mod detector_service;
pub mod diagnostic_logger;
pub mod farm_queue;
pub mod farming_service;
pub mod gql_client;
pub mod notification_service;
pub mod scheduler;
pub mod store_service;
pub mod telegram_service;
pub mod twitch_api;

#[cfg(test)]
pub mod test_support;
