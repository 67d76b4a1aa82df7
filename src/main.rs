use winit::error::EventLoopError;

use trigon::AppConfig;

fn main() -> Result<(), EventLoopError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    trigon::run(AppConfig::default())
}
