//! Frame scheduling
//!
//! Drives one frame per call through a fixed ring of frame slots:
//!
//! ```text
//! WAIT_FENCE -> ACQUIRE -> UPDATE_DESCRIPTORS -> RECORD -> SUBMIT -> PRESENT -> ADVANCE
//! ```
//!
//! A slot is only reused after its fence has been waited on, so at most
//! `frames_in_flight` submissions are ever outstanding. The GPU work itself is
//! behind [`FrameBackend`]; [`crate::render::vulkan::VulkanRenderer`] is the
//! real implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::render::vulkan::surface::FramebufferSource;
use crate::render::vulkan::swapchain_manager::RecreateOutcome;
use crate::render::vulkan::VulkanResult;

/// Shared "framebuffer was resized" flag
///
/// Window callbacks only raise it; the scheduler consumes it after present.
#[derive(Debug, Clone, Default)]
pub struct ResizeSignal(Arc<AtomicBool>);

impl ResizeSignal {
    /// Create a lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn notify(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lower the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; suboptimal images are still rendered to
    Acquired {
        /// Index into the swapchain images
        image_index: u32,
        /// The swapchain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The swapchain must be recreated before it can be used
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented and still matching the surface
    Presented,
    /// Presented, but the swapchain should be recreated
    Suboptimal,
    /// Not presented; the swapchain must be recreated
    OutOfDate,
}

/// What happened during one [`FrameScheduler::run_frame`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented
    Presented {
        /// Frame slot that was used
        slot: usize,
        /// Swapchain image that was rendered to
        image_index: u32,
        /// The swapchain was recreated after present
        swapchain_recreated: bool,
    },
    /// Acquire reported out of date; the swapchain was recreated and nothing was submitted
    Skipped,
    /// The framebuffer has no area; rendering waits for it to grow
    Deferred,
}

/// GPU side of the frame protocol
///
/// Every method takes the slot index the scheduler is currently working on.
pub trait FrameBackend {
    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next swapchain image, signaling the slot's image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Write the slot's per-frame uniforms
    fn update_descriptors(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Reset and re-record the slot's command buffer
    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Reset the slot's fence and submit its command buffer
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present `image_index` once the slot's rendering has finished
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Replace the swapchain and everything derived from it
    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<RecreateOutcome>;

    /// Block until the device is idle
    fn wait_idle(&mut self) -> VulkanResult<()>;
}

/// Frame-slot ring driver
#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    current_slot: usize,
    resize: ResizeSignal,
    recreate_pending: bool,
    frames_presented: u64,
}

impl FrameScheduler {
    /// Create a scheduler over `frames_in_flight` slots (at least one)
    pub fn new(frames_in_flight: usize, resize: ResizeSignal) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_slot: 0,
            resize,
            recreate_pending: false,
            frames_presented: 0,
        }
    }

    /// Slot the next frame will use
    pub const fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of slots in the ring
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Frames presented so far
    pub const fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Whether a deferred recreation is waiting for a non-zero framebuffer
    pub const fn recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Run one frame cycle
    pub fn run_frame<B, W>(&mut self, backend: &mut B, window: &W) -> VulkanResult<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
        W: FramebufferSource + ?Sized,
    {
        if self.recreate_pending && self.recreate(backend, window)? == RecreateOutcome::Deferred {
            return Ok(FrameOutcome::Deferred);
        }

        let slot = self.current_slot;
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::trace!("Acquired suboptimal image {image_index}");
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire, recreating");
                // This recreate already picks up any pending resize
                self.resize.take();
                return match self.recreate(backend, window)? {
                    RecreateOutcome::Deferred => Ok(FrameOutcome::Deferred),
                    RecreateOutcome::Recreated { .. } => Ok(FrameOutcome::Skipped),
                };
            }
        };

        backend.update_descriptors(slot, image_index)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        let resized = self.resize.take();
        let swapchain_recreated = if resized || presented != PresentOutcome::Presented {
            if presented != PresentOutcome::Presented {
                log::warn!("Swapchain {presented:?} on present, recreating");
            } else {
                log::debug!("Framebuffer resized, recreating swapchain");
            }
            matches!(self.recreate(backend, window)?, RecreateOutcome::Recreated { .. })
        } else {
            false
        };

        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
        self.frames_presented += 1;
        log::trace!("Frame {} presented from slot {slot}", self.frames_presented);

        Ok(FrameOutcome::Presented {
            slot,
            image_index,
            swapchain_recreated,
        })
    }

    /// Wait for all submitted work before teardown
    pub fn shutdown<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<()> {
        log::debug!("Frame scheduler shutting down after {} frames", self.frames_presented);
        backend.wait_idle()
    }

    fn recreate<B, W>(&mut self, backend: &mut B, window: &W) -> VulkanResult<RecreateOutcome>
    where
        B: FrameBackend + ?Sized,
        W: FramebufferSource + ?Sized,
    {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            self.recreate_pending = true;
            return Ok(RecreateOutcome::Deferred);
        }

        let outcome = backend.recreate_swapchain((width, height))?;
        self.recreate_pending = outcome == RecreateOutcome::Deferred;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Update(usize, u32),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate(u32, u32),
        WaitIdle,
    }

    /// Simulated GPU: submissions stay outstanding until their slot is waited on
    struct MockBackend {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        acquire_results: VecDeque<AcquireOutcome>,
        present_results: VecDeque<PresentOutcome>,
        outstanding: Vec<usize>,
        max_outstanding: usize,
    }

    impl MockBackend {
        fn new(image_count: u32) -> Self {
            crate::foundation::logging::init_for_tests();
            Self {
                calls: Vec::new(),
                image_count,
                next_image: 0,
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                outstanding: Vec::new(),
                max_outstanding: 0,
            }
        }

        fn count(&self, wanted: fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| wanted(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Wait(slot));
            self.outstanding.retain(|&s| s != slot);
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            if let Some(outcome) = self.acquire_results.pop_front() {
                return Ok(outcome);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn update_descriptors(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Update(slot, image_index));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Submit(slot));
            assert!(!self.outstanding.contains(&slot), "slot {slot} reused before its fence was waited");
            self.outstanding.push(slot);
            self.max_outstanding = self.max_outstanding.max(self.outstanding.len());
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.present_results.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self, (width, height): (u32, u32)) -> VulkanResult<RecreateOutcome> {
            self.calls.push(Call::Recreate(width, height));
            Ok(RecreateOutcome::Recreated {
                render_pass_changed: false,
            })
        }

        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.calls.push(Call::WaitIdle);
            self.outstanding.clear();
            Ok(())
        }
    }

    #[test]
    fn test_flight_depth_is_bounded() {
        for frames_in_flight in 1..=4 {
            let mut backend = MockBackend::new(3);
            let mut scheduler = FrameScheduler::new(frames_in_flight, ResizeSignal::new());

            for _ in 0..20 {
                scheduler.run_frame(&mut backend, &(800, 600)).unwrap();
            }

            assert!(backend.max_outstanding <= frames_in_flight);
            assert_eq!(backend.max_outstanding, frames_in_flight.min(20));
        }
    }

    #[test]
    fn test_two_slots_alternate_and_wait_before_reuse() {
        let mut backend = MockBackend::new(3);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        let slots: Vec<usize> = (0..5)
            .map(|_| match scheduler.run_frame(&mut backend, &(800, 600)).unwrap() {
                FrameOutcome::Presented { slot, .. } => slot,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);

        // Frame 3 reuses slot 0: its wait must come after frame 1's submit and before frame 3's
        let submits: Vec<usize> = backend
            .calls
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Call::Submit(0))
            .map(|(i, _)| i)
            .collect();
        let third_frame_wait = backend
            .calls
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Call::Wait(0))
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        assert!(submits[0] < third_frame_wait);
        assert!(third_frame_wait < submits[1]);
    }

    #[test]
    fn test_cycle_order() {
        let mut backend = MockBackend::new(3);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        scheduler.run_frame(&mut backend, &(800, 600)).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Update(0, 0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_date_acquire_skips_without_advancing() {
        let mut backend = MockBackend::new(3);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        let outcome = scheduler.run_frame(&mut backend, &(1024, 768)).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 0);
        assert!(backend.calls.contains(&Call::Recreate(1024, 768)));

        // The same slot is retried and its fence is still usable
        let outcome = scheduler.run_frame(&mut backend, &(1024, 768)).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));
    }

    #[test]
    fn test_resize_behind_out_of_date_acquire_recreates_once() {
        let resize = ResizeSignal::new();
        let mut backend = MockBackend::new(3);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut scheduler = FrameScheduler::new(2, resize.clone());

        resize.notify();
        assert_eq!(scheduler.run_frame(&mut backend, &(1280, 720)).unwrap(), FrameOutcome::Skipped);
        let outcome = scheduler.run_frame(&mut backend, &(1280, 720)).unwrap();

        assert!(matches!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                swapchain_recreated: false,
                ..
            }
        ));
        assert_eq!(backend.count(|c| matches!(c, Call::Recreate(..))), 1);
        assert!(!resize.take());
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let mut backend = MockBackend::new(3);
        backend.acquire_results.push_back(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        });
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        let outcome = scheduler.run_frame(&mut backend, &(800, 600)).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 2,
                swapchain_recreated: false,
            }
        );
    }

    #[test]
    fn test_resize_recreates_after_present_and_advances() {
        let resize = ResizeSignal::new();
        let mut backend = MockBackend::new(3);
        let mut scheduler = FrameScheduler::new(2, resize.clone());

        resize.notify();
        let outcome = scheduler.run_frame(&mut backend, &(640, 480)).unwrap();

        assert!(matches!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                swapchain_recreated: true,
                ..
            }
        ));
        assert_eq!(scheduler.current_slot(), 1);
        assert_eq!(backend.calls[5], Call::Present(0, 0));
        assert_eq!(backend.calls[6], Call::Recreate(640, 480));
        assert!(!resize.take());
    }

    #[test]
    fn test_present_out_of_date_and_suboptimal_recreate() {
        let mut backend = MockBackend::new(3);
        backend.present_results.push_back(PresentOutcome::OutOfDate);
        backend.present_results.push_back(PresentOutcome::Suboptimal);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        for _ in 0..3 {
            scheduler.run_frame(&mut backend, &(800, 600)).unwrap();
        }

        assert_eq!(backend.count(|c| matches!(c, Call::Recreate(..))), 2);
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn test_zero_area_defers_until_restored() {
        let mut backend = MockBackend::new(3);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());

        assert_eq!(scheduler.run_frame(&mut backend, &(0, 0)).unwrap(), FrameOutcome::Deferred);
        assert!(scheduler.recreate_pending());
        assert_eq!(scheduler.run_frame(&mut backend, &(0, 600)).unwrap(), FrameOutcome::Deferred);
        assert_eq!(backend.count(|c| matches!(c, Call::Recreate(..))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Wait(_))), 1);

        let outcome = scheduler.run_frame(&mut backend, &(800, 600)).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));
        assert!(!scheduler.recreate_pending());
        assert_eq!(backend.calls[2], Call::Recreate(800, 600));
    }

    #[test]
    fn test_shutdown_waits_for_device() {
        let mut backend = MockBackend::new(2);
        let mut scheduler = FrameScheduler::new(2, ResizeSignal::new());
        scheduler.run_frame(&mut backend, &(800, 600)).unwrap();

        scheduler.shutdown(&mut backend).unwrap();

        assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
        assert!(backend.outstanding.is_empty());
    }

    #[test]
    fn test_resize_signal_is_shared() {
        let signal = ResizeSignal::new();
        let clone = signal.clone();
        clone.notify();
        assert!(signal.take());
        assert!(!signal.take());
    }
}
