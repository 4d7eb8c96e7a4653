use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::*;

/// Work queued on the simulated graphics queue
struct Submission {
    fence: u64,
    signal: u64,
    image: u32,
}

/// Simulated GPU timeline.
///
/// Submissions complete in FIFO order, and only when the host waits on a
/// fence or the device is idled, which is the slowest GPU the protocol can
/// face. Misuse of fences and semaphores is recorded in `violations`.
///
/// A semaphore counts as signaled from the moment a signal is queued until a
/// submit or present waits on it.
#[derive(Default)]
struct GpuState {
    next_id: u64,
    image_count: usize,
    fences: HashMap<u64, bool>,
    semaphores: HashMap<u64, bool>,
    fence_ids: Vec<u64>,
    queue: VecDeque<Submission>,
    acquire_script: VecDeque<u32>,
    acquire_calls: u32,
    submit_calls: u32,
    present_calls: u32,
    presents: Vec<(u32, u64)>,
    fail_acquire: HashMap<u32, VulkanError>,
    fail_submit: HashSet<u32>,
    missing_buffers: HashSet<u32>,
    fail_present: HashMap<u32, VulkanError>,
    suboptimal_present: HashSet<u32>,
    fence_waits: HashMap<u64, u32>,
    fence_resets: HashMap<u64, u32>,
    fence_signals: HashMap<u64, u32>,
    created: Vec<u64>,
    destroyed: Vec<u64>,
    max_outstanding: usize,
    idled: bool,
    violations: Vec<String>,
}

impl GpuState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.created.push(self.next_id);
        self.next_id
    }

    fn complete_next(&mut self) -> bool {
        match self.queue.pop_front() {
            Some(done) => {
                self.fences.insert(done.fence, true);
                *self.fence_signals.entry(done.fence).or_default() += 1;
                true
            }
            None => false,
        }
    }

    fn signal_semaphore(&mut self, id: u64, by: &str) {
        if self.semaphores[&id] {
            self.violations.push(format!("{by} signals semaphore {id} that is already signaled"));
        }
        self.semaphores.insert(id, true);
    }

    fn consume_semaphore(&mut self, id: u64, by: &str) {
        if !self.semaphores[&id] {
            self.violations.push(format!("{by} waits on unsignaled semaphore {id}"));
        }
        self.semaphores.insert(id, false);
    }

    fn destroy(&mut self, id: u64) {
        if self.queue.iter().any(|pending| pending.fence == id || pending.signal == id) {
            self.violations.push(format!("object {id} destroyed while in use"));
        }
        self.destroyed.push(id);
    }
}

#[derive(Clone)]
struct MockGpu {
    state: Rc<RefCell<GpuState>>,
}

struct MockFence {
    id: u64,
    state: Rc<RefCell<GpuState>>,
}

impl Drop for MockFence {
    fn drop(&mut self) {
        self.state.borrow_mut().destroy(self.id);
    }
}

struct MockSemaphore {
    id: u64,
    state: Rc<RefCell<GpuState>>,
}

impl Drop for MockSemaphore {
    fn drop(&mut self) {
        self.state.borrow_mut().destroy(self.id);
    }
}

impl MockGpu {
    fn new(image_count: usize) -> Self {
        let state = GpuState {
            image_count,
            ..GpuState::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    fn with_script(self, images: &[u32]) -> Self {
        self.state.borrow_mut().acquire_script.extend(images);
        self
    }

    fn fail_submit(&self, call: u32) {
        self.state.borrow_mut().fail_submit.insert(call);
    }

    fn drop_buffer(&self, image: u32) {
        self.state.borrow_mut().missing_buffers.insert(image);
    }

    fn fail_acquire(&self, call: u32, error: VulkanError) {
        self.state.borrow_mut().fail_acquire.insert(call, error);
    }

    fn fail_present(&self, call: u32, error: VulkanError) {
        self.state.borrow_mut().fail_present.insert(call, error);
    }

    fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    fn max_outstanding(&self) -> usize {
        self.state.borrow().max_outstanding
    }

    fn waits_on(&self, fence: u64) -> u32 {
        self.state.borrow().fence_waits.get(&fence).copied().unwrap_or(0)
    }

    /// Semaphores holding a signal nothing has waited on yet
    fn signaled_semaphores(&self) -> Vec<u64> {
        let state = self.state.borrow();
        let mut ids: Vec<u64> = state.semaphores.iter().filter(|(_, &on)| on).map(|(&id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    fn presents(&self) -> Vec<(u32, u64)> {
        self.state.borrow().presents.clone()
    }
}

impl FrameBackend for MockGpu {
    type Semaphore = MockSemaphore;
    type Fence = MockFence;
    type CommandBuffer = u32;

    fn create_semaphore(&self) -> VulkanResult<MockSemaphore> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.semaphores.insert(id, false);
        Ok(MockSemaphore {
            id,
            state: Rc::clone(&self.state),
        })
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<MockFence> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.fences.insert(id, signaled);
        state.fence_ids.push(id);
        Ok(MockFence {
            id,
            state: Rc::clone(&self.state),
        })
    }

    fn wait_for_fence(&self, fence: &MockFence, _timeout: u64) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        *state.fence_waits.entry(fence.id).or_default() += 1;

        while !state.fences[&fence.id] {
            if !state.complete_next() {
                return Err(VulkanError::Timeout);
            }
        }
        Ok(())
    }

    fn reset_fence(&self, fence: &MockFence) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        if state.queue.iter().any(|pending| pending.fence == fence.id) {
            state.violations.push(format!("fence {} reset while pending", fence.id));
        }
        state.fences.insert(fence.id, false);
        *state.fence_resets.entry(fence.id).or_default() += 1;
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.state.borrow().image_count
    }

    fn acquire_next_image(&self, _timeout: u64, signal: &MockSemaphore) -> VulkanResult<AcquiredImage> {
        let mut state = self.state.borrow_mut();
        state.acquire_calls += 1;
        let call = state.acquire_calls;

        if let Some(error) = state.fail_acquire.get(&call) {
            return Err(error.clone());
        }

        let index = match state.acquire_script.pop_front() {
            Some(index) => index,
            None => (call - 1) % u32::try_from(state.image_count).unwrap(),
        };
        state.signal_semaphore(signal.id, &format!("acquire {call}"));

        Ok(AcquiredImage {
            index,
            suboptimal: false,
        })
    }

    fn command_buffer_for(&self, image_index: u32) -> VulkanResult<u32> {
        if self.state.borrow().missing_buffers.contains(&image_index) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("no buffer for image {image_index}"),
            });
        }
        Ok(image_index)
    }

    fn submit(&self, buffer: u32, wait: &MockSemaphore, signal: &MockSemaphore, fence: &MockFence) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        state.submit_calls += 1;
        let call = state.submit_calls;

        if state.fail_submit.contains(&call) {
            return Err(VulkanError::Api(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }

        if state.fences[&fence.id] {
            state.violations.push(format!("submit {call} with signaled fence {}", fence.id));
        }
        if state.queue.iter().any(|pending| pending.image == buffer) {
            state.violations.push(format!("submit {call} renders into busy image {buffer}"));
        }
        state.consume_semaphore(wait.id, &format!("submit {call}"));
        state.signal_semaphore(signal.id, &format!("submit {call}"));

        state.queue.push_back(Submission {
            fence: fence.id,
            signal: signal.id,
            image: buffer,
        });
        state.max_outstanding = state.max_outstanding.max(state.queue.len());
        Ok(())
    }

    fn present(&self, image_index: u32, wait: &MockSemaphore) -> VulkanResult<bool> {
        let mut state = self.state.borrow_mut();
        state.present_calls += 1;
        let call = state.present_calls;
        state.presents.push((image_index, wait.id));

        // Out-of-date and device-lost presents still perform the wait
        state.consume_semaphore(wait.id, &format!("present {call}"));

        if let Some(error) = state.fail_present.get(&call) {
            return Err(error.clone());
        }
        Ok(state.suboptimal_present.contains(&call))
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        while state.complete_next() {}
        state.idled = true;
        Ok(())
    }
}

type MockSynchronizer = FrameSynchronizer<MockSemaphore, MockFence>;

fn synchronizer(gpu: &MockGpu, frames: usize) -> MockSynchronizer {
    FrameSynchronizer::new(gpu, frames, FrameTimeouts::default()).unwrap()
}

fn run(sync: &mut MockSynchronizer, gpu: &MockGpu, frames: usize) -> Vec<FrameStatus> {
    (0..frames).map(|_| sync.step(gpu)).collect()
}

#[test]
fn test_slots_rotate() {
    let gpu = MockGpu::new(3);
    let mut sync = synchronizer(&gpu, 2);

    let statuses = run(&mut sync, &gpu, 5);
    let slots: Vec<usize> = statuses.iter().map(FrameStatus::slot).collect();

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    assert!(statuses.iter().all(FrameStatus::is_presented));
    assert_eq!(sync.current_frame(), 1);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_current_frame_is_step_count_mod_slots() {
    for frames in 1..=3 {
        let gpu = MockGpu::new(3);
        let mut sync = synchronizer(&gpu, frames);

        for k in 0..10 {
            assert_eq!(sync.current_frame(), k % frames);
            sync.step(&gpu);
        }
    }
}

#[test]
fn test_outstanding_submissions_bounded_by_slots() {
    for frames in 1..=3 {
        let gpu = MockGpu::new(3);
        let mut sync = synchronizer(&gpu, frames);

        run(&mut sync, &gpu, 20);

        assert!(gpu.max_outstanding() <= frames);
        assert_eq!(gpu.max_outstanding(), frames);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }
}

#[test]
fn test_fences_cycle_once_per_use() {
    let gpu = MockGpu::new(2);
    let mut sync = synchronizer(&gpu, 2);

    run(&mut sync, &gpu, 10);
    sync.shutdown(&gpu).unwrap();

    let state = gpu.state.borrow();
    assert_eq!(state.fence_ids.len(), 2);
    for fence in &state.fence_ids {
        assert_eq!(state.fence_waits[fence], 5);
        assert_eq!(state.fence_resets[fence], 5);
        assert_eq!(state.fence_signals[fence], 5);
    }
    assert!(state.violations.is_empty(), "{:?}", state.violations);
}

#[test]
fn test_image_table_records_claiming_slot() {
    let gpu = MockGpu::new(3);
    let mut sync = synchronizer(&gpu, 2);

    assert_eq!(sync.image_count(), 3);
    assert!((0..3).all(|image| sync.image_fence(image).is_none()));

    run(&mut sync, &gpu, 2);
    assert!(sync.image_fence(2).is_none());

    let status = sync.step(&gpu);
    assert_eq!(
        status,
        FrameStatus::Presented {
            slot: 0,
            image_index: 2,
            suboptimal: false
        }
    );
    assert_eq!(sync.image_owner(2), Some(0));
    assert_eq!(
        sync.image_fence(2).map(|fence| fence.id),
        sync.slot_fence(0).map(|fence| fence.id)
    );
    assert_eq!(sync.image_owner(7), None);
}

#[test]
fn test_waits_for_other_slot_holding_image() {
    let gpu = MockGpu::new(2).with_script(&[0, 1, 1]);
    let mut sync = synchronizer(&gpu, 2);

    run(&mut sync, &gpu, 2);
    let slot1_fence = sync.slot_fence(1).map(|fence| fence.id).unwrap();
    assert_eq!(gpu.waits_on(slot1_fence), 1);

    let status = sync.step(&gpu);
    assert!(status.is_presented());
    assert_eq!(gpu.waits_on(slot1_fence), 2);
    assert_eq!(sync.image_owner(1), Some(0));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_failed_submit_drops_frame_and_advances() {
    let gpu = MockGpu::new(3);
    gpu.fail_submit(3);
    let mut sync = synchronizer(&gpu, 2);

    let statuses = run(&mut sync, &gpu, 3);
    assert!(statuses[0].is_presented() && statuses[1].is_presented());
    assert!(matches!(
        statuses[2],
        FrameStatus::Dropped {
            slot: 0,
            stage: FrameStage::Submit,
            error: VulkanError::Api(_)
        }
    ));
    assert_eq!(sync.current_frame(), 1);
    // step logs the failure at error level; the dropped count is its record
    assert_eq!(sync.stats().dropped, 1);
    // The claim from the dropped frame stays in place
    assert_eq!(sync.image_owner(2), Some(0));

    // Image 2 went back to the swapchain on slot 0's acquire semaphore (object 1)
    assert_eq!(gpu.presents().last(), Some(&(2, 1)));
    assert!(gpu.signaled_semaphores().is_empty(), "{:?}", gpu.signaled_semaphores());

    // Slot 0 acquires again on the same semaphore without a double signal
    let rest = run(&mut sync, &gpu, 2);
    assert_eq!(rest.iter().map(FrameStatus::slot).collect::<Vec<_>>(), vec![1, 0]);
    assert!(rest.iter().all(FrameStatus::is_presented), "{rest:?}");

    let stats = sync.stats();
    assert_eq!((stats.presented, stats.dropped, stats.total()), (4, 1, 5));
    assert_eq!(gpu.presents().len(), 5);
    assert!(gpu.signaled_semaphores().is_empty(), "{:?}", gpu.signaled_semaphores());
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_missing_command_buffer_returns_image() {
    let gpu = MockGpu::new(3);
    gpu.drop_buffer(1);
    let mut sync = synchronizer(&gpu, 2);

    let statuses = run(&mut sync, &gpu, 4);
    assert!(matches!(
        statuses[1],
        FrameStatus::Dropped {
            slot: 1,
            stage: FrameStage::Submit,
            error: VulkanError::InvalidOperation { .. }
        }
    ));
    assert!(statuses[2].is_presented() && statuses[3].is_presented());

    // Slot 1's acquire semaphore is object 4; its fence was never reset
    assert!(gpu.presents().contains(&(1, 4)));
    let slot1_fence = sync.slot_fence(1).map(|fence| fence.id).unwrap();
    assert_eq!(gpu.state.borrow().fence_resets.get(&slot1_fence).copied(), Some(1));

    assert!(gpu.signaled_semaphores().is_empty(), "{:?}", gpu.signaled_semaphores());
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_out_of_date_acquire_is_dropped() {
    let gpu = MockGpu::new(3);
    gpu.fail_acquire(2, VulkanError::SwapchainOutOfDate);
    let mut sync = synchronizer(&gpu, 2);

    let statuses = run(&mut sync, &gpu, 3);

    assert_eq!(
        statuses[1],
        FrameStatus::Dropped {
            slot: 1,
            stage: FrameStage::Acquire,
            error: VulkanError::SwapchainOutOfDate
        }
    );
    assert!(statuses[1].needs_recreation());
    assert!(statuses[2].is_presented());
    assert_eq!(sync.current_frame(), 1);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_failed_present_keeps_claim() {
    let gpu = MockGpu::new(3);
    gpu.fail_present(1, VulkanError::DeviceLost);
    let mut sync = synchronizer(&gpu, 2);

    let first = sync.step(&gpu);
    assert_eq!(
        first,
        FrameStatus::Dropped {
            slot: 0,
            stage: FrameStage::Present,
            error: VulkanError::DeviceLost
        }
    );
    assert_eq!(sync.image_owner(0), Some(0));
    // The failed present still consumed the render-finished signal
    assert!(gpu.signaled_semaphores().is_empty(), "{:?}", gpu.signaled_semaphores());

    let rest = run(&mut sync, &gpu, 4);
    assert!(rest.iter().all(FrameStatus::is_presented));
    assert_eq!(gpu.presents().len(), 5);
    assert!(gpu.signaled_semaphores().is_empty(), "{:?}", gpu.signaled_semaphores());
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_out_of_range_image_is_dropped() {
    let gpu = MockGpu::new(3).with_script(&[5]);
    let mut sync = synchronizer(&gpu, 2);

    let status = sync.step(&gpu);
    assert!(matches!(
        status,
        FrameStatus::Dropped {
            slot: 0,
            stage: FrameStage::Acquire,
            error: VulkanError::InvalidOperation { .. }
        }
    ));
    assert_eq!(sync.current_frame(), 1);
}

#[test]
fn test_single_slot() {
    let gpu = MockGpu::new(3);
    let mut sync = synchronizer(&gpu, 1);

    let statuses = run(&mut sync, &gpu, 6);

    assert!(statuses.iter().all(|status| status.is_presented() && status.slot() == 0));
    assert_eq!(gpu.max_outstanding(), 1);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_more_slots_than_images() {
    let gpu = MockGpu::new(2);
    let mut sync = synchronizer(&gpu, 3);

    let statuses = run(&mut sync, &gpu, 9);

    assert!(statuses.iter().all(FrameStatus::is_presented));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_zero_slots_rejected() {
    let gpu = MockGpu::new(3);
    let result = FrameSynchronizer::new(&gpu, 0, FrameTimeouts::default());
    assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
}

#[test]
fn test_shutdown_releases_everything_once() {
    let gpu = MockGpu::new(3);
    let mut sync = synchronizer(&gpu, 3);

    run(&mut sync, &gpu, 7);
    assert!(!gpu.state.borrow().queue.is_empty());
    sync.shutdown(&gpu).unwrap();

    let state = gpu.state.borrow();
    assert!(state.idled);
    assert_eq!(state.created.len(), 9);

    let mut created = state.created.clone();
    let mut destroyed = state.destroyed.clone();
    created.sort_unstable();
    destroyed.sort_unstable();
    assert_eq!(created, destroyed);
    assert!(state.violations.is_empty(), "{:?}", state.violations);
}

#[test]
fn test_suboptimal_present_still_counts() {
    let gpu = MockGpu::new(3);
    gpu.state.borrow_mut().suboptimal_present.insert(2);
    let mut sync = synchronizer(&gpu, 2);

    let statuses = run(&mut sync, &gpu, 3);

    assert_eq!(
        statuses[1],
        FrameStatus::Presented {
            slot: 1,
            image_index: 1,
            suboptimal: true
        }
    );
    assert!(statuses[1].needs_recreation());
    assert_eq!(sync.stats().presented, 3);
    assert_eq!(sync.stats().suboptimal, 1);
}

#[test]
fn test_timeouts_from_config() {
    let config = TimeoutConfig {
        acquire_ms: Some(5),
        fence_ms: None,
    };
    let timeouts = FrameTimeouts::from(&config);
    assert_eq!(timeouts.acquire_ns, 5_000_000);
    assert_eq!(timeouts.fence_ns, u64::MAX);
}
