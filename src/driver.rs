// Application driver
//
// Uninitialized -> WindowReady -> VulkanReady -> Running -> TornDown.
// Initialization failures map to order-correct rollback of whatever
// was created; teardown runs exactly once however the run concluded.

use anyhow::{anyhow, Context, Result};

use crate::chain::ResourceChain;
use crate::config::WindowConfig;
use crate::gateway::NativeGateway;
use crate::handle::ResourceKind;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DriverState {
    Uninitialized,
    WindowReady,
    VulkanReady,
    Running,
    TornDown,
}

pub struct Driver<G: NativeGateway> {
    gateway: G,
    chain: ResourceChain,
    state: DriverState,
    window: WindowConfig,
}

impl<G: NativeGateway> Driver<G> {
    pub fn new(gateway: G, window: WindowConfig) -> Self {
        Self {
            gateway,
            chain: ResourceChain::new(),
            state: DriverState::Uninitialized,
            window,
        }
    }

    /// Initialize, loop until the window asks to close, tear down.
    /// Teardown also runs when initialization past the window or the
    /// run loop fails; the error is propagated after it.
    pub fn run(&mut self) -> Result<()> {
        self.init_window()?;
        if let Err(err) = self.init_vulkan() {
            self.teardown();
            return Err(err);
        }

        self.state = DriverState::Running;
        log::info!("entering run loop");
        let run_result = self.run_loop();

        self.teardown();
        run_result
    }

    fn init_window(&mut self) -> Result<()> {
        let window = self.gateway.create_window(
            self.window.width,
            self.window.height,
            &self.window.title,
        );
        if !window.is_valid() {
            // Nothing was created, so there is nothing to tear down.
            return Err(anyhow!("Window creation failed"));
        }
        log::info!(
            "created {}x{} window \"{}\"",
            self.window.width,
            self.window.height,
            self.window.title
        );
        self.chain.adopt_window(window);
        self.state = DriverState::WindowReady;
        Ok(())
    }

    fn init_vulkan(&mut self) -> Result<()> {
        self.chain
            .build_vulkan(&mut self.gateway)
            .context("Vulkan initialization failed")?;
        self.state = DriverState::VulkanReady;
        Ok(())
    }

    /// One bounded event pump and one close-flag check per iteration.
    fn run_loop(&mut self) -> Result<()> {
        let window = self
            .chain
            .raw(ResourceKind::Window)
            .context("run loop without a window")?;
        while !self.gateway.window_should_close(window) {
            self.gateway
                .poll_events()
                .context("event polling failed")?;
        }
        log::info!("close requested");
        Ok(())
    }

    /// Full reverse-order release: chain (swapchain back to window),
    /// then windowing-library terminate. No-op unless something was
    /// created, and never runs twice.
    fn teardown(&mut self) {
        match self.state {
            DriverState::Uninitialized | DriverState::TornDown => return,
            _ => {}
        }
        log::info!("tearing down {} chain entries", self.chain.len());
        self.chain.release_all(&mut self.gateway);
        self.gateway.terminate();
        self.state = DriverState::TornDown;
    }
}

impl<G: NativeGateway> Drop for Driver<G> {
    // Backstop for early exits between init and run; the normal paths
    // have already torn down and this is a no-op then.
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{Call, MockGateway};

    fn test_window() -> WindowConfig {
        WindowConfig {
            title: "test".to_string(),
            width: 800,
            height: 600,
        }
    }

    fn driver(gateway: MockGateway) -> Driver<MockGateway> {
        Driver::new(gateway, test_window())
    }

    #[test]
    fn full_run_tears_down_in_order() {
        // Scenario A: everything succeeds, close flag on the first
        // check - teardown is four chain destroys, the window destroy,
        // then terminate.
        let mut driver = driver(MockGateway::new());

        driver.run().unwrap();

        let tail: Vec<_> = driver
            .gateway
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Destroy(..) | Call::Terminate))
            .cloned()
            .collect();
        let kinds: Vec<_> = tail
            .iter()
            .filter_map(|call| match call {
                Call::Destroy(kind, _) => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Swapchain,
                ResourceKind::Device,
                ResourceKind::Surface,
                ResourceKind::Instance,
                ResourceKind::Window,
            ]
        );
        assert_eq!(tail.last(), Some(&Call::Terminate));
    }

    #[test]
    fn window_failure_is_fatal_with_no_teardown() {
        let mut driver = driver(MockGateway::failing(&[ResourceKind::Window]));

        let err = driver.run().unwrap_err();
        assert!(err.to_string().contains("Window"));

        assert!(driver.gateway.destroys().is_empty());
        assert!(!driver.gateway.calls.contains(&Call::Terminate));
    }

    #[test]
    fn surface_failure_rolls_back_then_destroys_window_and_terminates() {
        // Scenario B: the reported failure names Surface; the window
        // is still destroyed by the driver.
        let mut driver = driver(MockGateway::failing(&[ResourceKind::Surface]));

        let err = driver.run().unwrap_err();
        assert!(format!("{err:#}").contains("Surface creation failed"));

        assert_eq!(
            driver.gateway.destroys(),
            vec![
                ResourceKind::Instance,
                ResourceKind::Window,
            ]
        );
        assert!(driver.gateway.calls.contains(&Call::Terminate));
        assert_eq!(driver.gateway.poll_count(), 0);
    }

    #[test]
    fn invalid_queue_surfaces_as_device_failure() {
        // Scenario C, end to end through the driver.
        let mut gateway = MockGateway::new();
        gateway.fail_graphics_queue = true;
        let mut driver = driver(gateway);

        let err = driver.run().unwrap_err();
        assert!(format!("{err:#}").contains("Device creation failed"));

        assert_eq!(
            driver.gateway.destroys(),
            vec![
                ResourceKind::Surface,
                ResourceKind::Instance,
                ResourceKind::Window,
            ]
        );
    }

    #[test]
    fn immediate_close_polls_at_most_once() {
        // Scenario D: the close flag is already set when Running is
        // entered.
        let mut driver = driver(MockGateway::new());

        driver.run().unwrap();

        assert!(driver.gateway.poll_count() <= 1);
        assert!(driver.gateway.calls.contains(&Call::Terminate));
    }

    #[test]
    fn poll_fault_still_tears_down_fully() {
        let mut gateway = MockGateway::new();
        gateway.poll_fails = true;
        gateway.close_after = 10;
        let mut driver = driver(gateway);

        let err = driver.run().unwrap_err();
        assert!(format!("{err:#}").contains("event polling failed"));

        assert_eq!(driver.gateway.destroys().len(), 5);
        assert_eq!(
            driver.gateway.calls.last(),
            Some(&Call::Terminate)
        );
    }

    #[test]
    fn loop_runs_one_poll_per_close_check() {
        let mut gateway = MockGateway::new();
        gateway.close_after = 3;
        let mut driver = driver(gateway);

        driver.run().unwrap();

        assert_eq!(driver.gateway.poll_count(), 3);
    }

    #[test]
    fn teardown_runs_exactly_once() {
        let mut driver = driver(MockGateway::new());
        driver.init_window().unwrap();
        driver.init_vulkan().unwrap();
        assert!(driver.gateway.destroys().is_empty());

        driver.teardown();
        assert_eq!(driver.gateway.destroys().len(), 5);
        let terminates = driver
            .gateway
            .calls
            .iter()
            .filter(|&&call| call == Call::Terminate)
            .count();
        assert_eq!(terminates, 1);

        // A second call - and the Drop backstop after it - see
        // TornDown and issue nothing further.
        driver.teardown();
        assert_eq!(driver.gateway.destroys().len(), 5);
    }
}
