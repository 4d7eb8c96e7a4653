//! Frame pacing
//!
//! [`FrameSynchronizer`] lets the CPU record and submit up to `N` frames
//! ahead of the GPU. Each flight slot owns an acquire semaphore, a
//! render-finished semaphore and a fence. A per-image table remembers which
//! slot last submitted against each swapchain image, so an image that comes
//! back early (out-of-order acquisition, or more slots than images) is not
//! rendered into while an older frame still uses it.
//!
//! One call to [`FrameSynchronizer::step`] is one frame:
//!
//! 1. wait for the current slot's fence
//! 2. acquire an image, signaling the slot's acquire semaphore
//! 3. if another slot still owns the image, wait for that slot's fence
//! 4. record the current slot as the image's owner
//! 5. reset the slot fence and submit the image's command buffer
//! 6. present, waiting on the slot's render-finished semaphore
//! 7. advance to the next slot
//!
//! A failure anywhere drops the frame without unwinding the steps already
//! taken, and the slot index advances regardless. When the failure comes
//! after a successful acquire but before submission, the image is presented
//! straight off the acquire semaphore. That hands the image back to the
//! swapchain and consumes the semaphore's signal, so the slot can acquire
//! again next time round.

mod backend;

#[cfg(test)]
mod tests;

use std::fmt;

pub use backend::{AcquiredImage, FrameBackend};

use crate::config::TimeoutConfig;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Wait limits, in nanoseconds, for the blocking calls of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimeouts {
    /// Limit for image acquisition
    pub acquire_ns: u64,
    /// Limit for each fence wait
    pub fence_ns: u64,
}

impl Default for FrameTimeouts {
    fn default() -> Self {
        Self {
            acquire_ns: u64::MAX,
            fence_ns: u64::MAX,
        }
    }
}

impl From<&TimeoutConfig> for FrameTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            acquire_ns: config.acquire_ns(),
            fence_ns: config.fence_ns(),
        }
    }
}

/// Where in the frame a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    /// Waiting for the slot's previous submission
    Throttle,
    /// Acquiring a swapchain image
    Acquire,
    /// Waiting for another slot that still owns the image
    ImageInUse,
    /// Resetting the fence or submitting
    Submit,
    /// Queueing the image for presentation
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Throttle => "throttle",
            Self::Acquire => "acquire",
            Self::ImageInUse => "image-in-use wait",
            Self::Submit => "submit",
            Self::Present => "present",
        };
        f.write_str(name)
    }
}

/// Outcome of one [`FrameSynchronizer::step`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and queued for presentation
    Presented {
        /// Flight slot used
        slot: usize,
        /// Swapchain image rendered into
        image_index: u32,
        /// Acquire or present reported the swapchain as suboptimal
        suboptimal: bool,
    },
    /// The frame was abandoned
    Dropped {
        /// Flight slot used
        slot: usize,
        /// Step that failed
        stage: FrameStage,
        /// Underlying failure
        error: VulkanError,
    },
}

impl FrameStatus {
    /// Flight slot the frame used
    pub fn slot(&self) -> usize {
        match self {
            Self::Presented { slot, .. } | Self::Dropped { slot, .. } => *slot,
        }
    }

    /// Whether the frame reached the presentation queue
    pub fn is_presented(&self) -> bool {
        matches!(self, Self::Presented { .. })
    }

    /// Whether the swapchain no longer matches the surface
    pub fn needs_recreation(&self) -> bool {
        match self {
            Self::Presented { suboptimal, .. } => *suboptimal,
            Self::Dropped { error, .. } => *error == VulkanError::SwapchainOutOfDate,
        }
    }
}

/// Running totals over all frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames queued for presentation
    pub presented: u64,
    /// Frames abandoned
    pub dropped: u64,
    /// Presented frames on a suboptimal swapchain
    pub suboptimal: u64,
}

impl FrameStats {
    /// All frames attempted
    pub fn total(&self) -> u64 {
        self.presented + self.dropped
    }
}

struct FlightSlot<S, F> {
    image_available: S,
    render_finished: S,
    in_flight: F,
    // A signal is pending or delivered. Cleared between reset and a successful submit.
    armed: bool,
}

impl<S, F> FlightSlot<S, F> {
    fn new<B: FrameBackend<Semaphore = S, Fence = F>>(backend: &B) -> VulkanResult<Self> {
        Ok(Self {
            image_available: backend.create_semaphore()?,
            render_finished: backend.create_semaphore()?,
            in_flight: backend.create_fence(true)?,
            armed: true,
        })
    }
}

/// Bounded frames-in-flight pacing over a [`FrameBackend`]
///
/// Generic over the backend's semaphore and fence types rather than the
/// backend itself, so a backend that borrows the swapchain can be built per
/// call while the synchronizer lives on.
pub struct FrameSynchronizer<S, F> {
    slots: Vec<FlightSlot<S, F>>,
    image_owner: Vec<Option<usize>>,
    current: usize,
    timeouts: FrameTimeouts,
    stats: FrameStats,
}

type StepResult<T> = Result<T, (FrameStage, VulkanError)>;

impl<S, F> FrameSynchronizer<S, F> {
    /// Create `frames_in_flight` slots and an empty image table
    ///
    /// Slot fences start signaled so the first wait on each returns at once.
    pub fn new<B: FrameBackend<Semaphore = S, Fence = F>>(backend: &B, frames_in_flight: usize, timeouts: FrameTimeouts) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "At least one frame in flight is required".to_string(),
            });
        }

        let slots = (0..frames_in_flight)
            .map(|_| FlightSlot::new(backend))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Created {} flight slots for {} swapchain images",
            frames_in_flight,
            backend.image_count()
        );

        Ok(Self {
            slots,
            image_owner: vec![None; backend.image_count()],
            current: 0,
            timeouts,
            stats: FrameStats::default(),
        })
    }

    /// Render and present one frame, then advance to the next slot
    ///
    /// Never fails; problems are logged and reported as
    /// [`FrameStatus::Dropped`].
    pub fn step<B: FrameBackend<Semaphore = S, Fence = F>>(&mut self, backend: &B) -> FrameStatus {
        let slot = self.current;

        let status = match self.run_frame(backend, slot) {
            Ok(acquired) => {
                self.stats.presented += 1;
                if acquired.suboptimal {
                    self.stats.suboptimal += 1;
                    log::warn!("Swapchain is suboptimal (slot {slot}, image {})", acquired.index);
                }
                FrameStatus::Presented {
                    slot,
                    image_index: acquired.index,
                    suboptimal: acquired.suboptimal,
                }
            }
            Err((stage, error)) => {
                self.stats.dropped += 1;
                if error == VulkanError::SwapchainOutOfDate {
                    log::warn!("Frame dropped in slot {slot} at {stage}: swapchain out of date");
                } else {
                    log::error!("Frame dropped in slot {slot} at {stage}: {error}");
                }
                FrameStatus::Dropped { slot, stage, error }
            }
        };

        self.current = (slot + 1) % self.slots.len();
        status
    }

    fn run_frame<B: FrameBackend<Semaphore = S, Fence = F>>(
        &mut self,
        backend: &B,
        slot: usize,
    ) -> StepResult<AcquiredImage> {
        if self.slots[slot].armed {
            backend
                .wait_for_fence(&self.slots[slot].in_flight, self.timeouts.fence_ns)
                .map_err(|e| (FrameStage::Throttle, e))?;
        }

        let acquired = backend
            .acquire_next_image(self.timeouts.acquire_ns, &self.slots[slot].image_available)
            .map_err(|e| (FrameStage::Acquire, e))?;

        let image = usize::try_from(acquired.index)
            .ok()
            .filter(|&index| index < self.image_owner.len())
            .ok_or_else(|| {
                let error = VulkanError::InvalidOperation {
                    reason: format!(
                        "Acquired image {} but the swapchain has {}",
                        acquired.index,
                        self.image_owner.len()
                    ),
                };
                (FrameStage::Acquire, error)
            })?;

        if let Err(failure) = self.submit_frame(backend, slot, image, acquired.index) {
            self.return_image(backend, slot, acquired.index);
            return Err(failure);
        }

        let frame = &self.slots[slot];
        let present_suboptimal = backend
            .present(acquired.index, &frame.render_finished)
            .map_err(|e| (FrameStage::Present, e))?;

        Ok(AcquiredImage {
            index: acquired.index,
            suboptimal: acquired.suboptimal || present_suboptimal,
        })
    }

    fn submit_frame<B: FrameBackend<Semaphore = S, Fence = F>>(
        &mut self,
        backend: &B,
        slot: usize,
        image: usize,
        image_index: u32,
    ) -> StepResult<()> {
        if let Some(owner) = self.image_owner[image] {
            if owner != slot && self.slots[owner].armed {
                backend
                    .wait_for_fence(&self.slots[owner].in_flight, self.timeouts.fence_ns)
                    .map_err(|e| (FrameStage::ImageInUse, e))?;
            }
        }

        self.image_owner[image] = Some(slot);

        let buffer = backend
            .command_buffer_for(image_index)
            .map_err(|e| (FrameStage::Submit, e))?;

        let frame = &mut self.slots[slot];

        backend
            .reset_fence(&frame.in_flight)
            .map_err(|e| (FrameStage::Submit, e))?;
        frame.armed = false;

        backend
            .submit(buffer, &frame.image_available, &frame.render_finished, &frame.in_flight)
            .map_err(|e| (FrameStage::Submit, e))?;
        frame.armed = true;

        Ok(())
    }

    // Present the untouched image gated on the acquire semaphore
    fn return_image<B: FrameBackend<Semaphore = S, Fence = F>>(&self, backend: &B, slot: usize, image_index: u32) {
        if let Err(e) = backend.present(image_index, &self.slots[slot].image_available) {
            log::warn!("Could not hand image {image_index} back after a dropped frame: {e}");
        }
    }

    /// Slot the next [`step`](Self::step) will use
    pub fn current_frame(&self) -> usize {
        self.current
    }

    /// Number of flight slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries in the image table
    pub fn image_count(&self) -> usize {
        self.image_owner.len()
    }

    /// Slot that last submitted against `image_index`, if any
    pub fn image_owner(&self, image_index: usize) -> Option<usize> {
        self.image_owner.get(image_index).copied().flatten()
    }

    /// Fence guarding the last submission against `image_index`, if any
    pub fn image_fence(&self, image_index: usize) -> Option<&F> {
        self.image_owner(image_index).map(|slot| &self.slots[slot].in_flight)
    }

    /// In-flight fence of a slot
    pub fn slot_fence(&self, slot: usize) -> Option<&F> {
        self.slots.get(slot).map(|frame| &frame.in_flight)
    }

    /// Totals since creation
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Wait for the device to go idle, then release every sync object
    ///
    /// The objects are released even if the wait fails; the error is still
    /// returned.
    pub fn shutdown<B: FrameBackend<Semaphore = S, Fence = F>>(self, backend: &B) -> VulkanResult<()> {
        let result = backend.wait_idle();
        if let Err(e) = &result {
            log::error!("Device wait idle failed during shutdown: {e}");
        }

        log::debug!(
            "Releasing {} flight slots after {} frames ({} dropped)",
            self.slots.len(),
            self.stats.total(),
            self.stats.dropped
        );
        drop(self);

        result
    }
}
