// =============================================================================
// VULKAN BRING-UP - resource-chain lifecycle demo
// =============================================================================
//
// Creates the full dependency chain
//
//   Window -> Instance -> Surface -> PhysicalDevice -> Device(+Queues)
//          -> Swapchain
//
// runs the event loop until the window asks to close, and tears the
// chain down in exact reverse order. Any mid-chain failure rolls back
// whatever was already created before the error is reported.

mod backend;
mod chain;
mod config;
mod driver;
mod gateway;
mod handle;

use anyhow::Result;
use backend::VulkanGateway;
use config::Config;
use driver::Driver;

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan bring-up");
    log::info!(
        "Window: {}x{} (\"{}\")",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let gateway = VulkanGateway::new(&config);
    let mut driver = Driver::new(gateway, config.window.clone());
    driver.run()
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}
