//! Vulkan context management
//!
//! Instance, optional debug messenger, window surface, physical device
//! selection and logical device. Each piece is an RAII wrapper, and
//! [`VulkanContext`] declares them in reverse creation order so they are
//! destroyed device first, instance last.

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Device, Entry, Instance};

use super::{VulkanError, VulkanResult, Window};
use crate::config::BootstrapConfig;
use crate::render::error::{RendererError, SetupStage, StageExt};

/// Graphics and presentation queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family used for draw submissions
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilies {
    /// Whether one family serves both roles
    pub fn is_shared(self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What a surface offers on a given physical device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count and extent limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A device can only drive the surface if it offers at least one format and mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    validation_enabled: bool,
}

impl VulkanInstance {
    /// Create the instance with the window system's extensions
    ///
    /// Validation layers are requested only when enabled in `config` and
    /// actually installed; missing layers produce a warning and the instance
    /// is created without any.
    pub fn new(window: &Window, config: &BootstrapConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = to_cstring(&config.application_name)?;
        let engine_name = to_cstring("vk_present")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation_enabled = config.enable_validation && Self::layers_available(&entry, &config.required_instance_layers)?;

        let window_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}")))?;
        let extension_names = window_extensions
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
        if validation_enabled {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if validation_enabled {
            config
                .required_instance_layers
                .iter()
                .map(|name| to_cstring(name))
                .collect::<VulkanResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let layers: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::from_vk)?
        };

        log::info!(
            "Created Vulkan instance ({} extensions, validation {})",
            extensions.len(),
            if validation_enabled { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            validation_enabled,
        })
    }

    fn layers_available(entry: &Entry, required: &[String]) -> VulkanResult<bool> {
        let available: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::from_vk)?
            .iter()
            .map(|layer| name_from_raw(&layer.layer_name))
            .collect();

        let missing = missing_names(required, &available);
        if missing.is_empty() {
            Ok(true)
        } else {
            log::warn!("Validation layers requested but not available: {missing:?}; continuing without them");
            Ok(false)
        }
    }

    /// Vulkan loader entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance-level function table
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Whether validation layers were actually enabled
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation layer output into the `log` facade
pub struct DebugReporter {
    debug_utils: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugReporter {
    /// Register the messenger on an instance created with debug utils
    pub fn new(instance: &VulkanInstance) -> VulkanResult<Self> {
        let debug_utils = DebugUtils::new(instance.entry(), instance.instance());

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::from_vk)?
        };

        Ok(Self { debug_utils, messenger })
    }
}

impl Drop for DebugReporter {
    fn drop(&mut self) {
        unsafe {
            self.debug_utils.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::trace!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// Window surface wrapper with RAII cleanup
pub struct PresentationSurface {
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
}

impl PresentationSurface {
    /// Create a surface for the window through GLFW
    pub fn new(instance: &VulkanInstance, window: &mut Window) -> VulkanResult<Self> {
        let surface_loader = Surface::new(instance.entry(), instance.instance());
        let surface = window
            .create_vulkan_surface(instance.instance().handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;

        Ok(Self { surface_loader, surface })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Check if a queue family can present to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::from_vk)
        }
    }

    /// Query capabilities, formats and present modes for a physical device
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)
                    .map_err(VulkanError::from_vk)?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)
                    .map_err(VulkanError::from_vk)?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)
                    .map_err(VulkanError::from_vk)?,
            })
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue families used for graphics and presentation
    pub families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Pick the best device that can render to and present on `surface`
    pub fn select(instance: &Instance, surface: &PresentationSurface, config: &BootstrapConfig) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::from_vk)? };

        let mut best: Option<(u32, Self)> = None;
        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let name = name_from_raw(&properties.device_name);

            match Self::evaluate(instance, device, properties, surface, config) {
                Ok(info) => {
                    let score = rank_device(properties.device_type, config.prefer_discrete_gpu);
                    log::info!("Candidate GPU: {name} ({:?}, score {score})", properties.device_type);
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, info));
                    }
                }
                Err(e) => log::info!("Skipping GPU {name}: {e}"),
            }
        }

        let (_, info) = best.ok_or(VulkanError::NoSuitableDevice)?;
        log::info!("Selected GPU: {}", name_from_raw(&info.properties.device_name));
        Ok(info)
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        properties: vk::PhysicalDeviceProperties,
        surface: &PresentationSurface,
        config: &BootstrapConfig,
    ) -> VulkanResult<Self> {
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let families = find_queue_families(&queue_families, |index| surface.supports_present(device, index))?
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics and present queue families".to_string()))?;

        let available: Vec<String> = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::from_vk)?
        }
        .iter()
        .map(|ext| name_from_raw(&ext.extension_name))
        .collect();

        let missing = missing_names(&config.required_device_extensions, &available);
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing device extensions: {missing:?}"
            )));
        }

        if !surface.support(device)?.is_adequate() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            families,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl LogicalDevice {
    /// Create the device with one queue per distinct family and the configured extensions
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo, config: &BootstrapConfig) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = physical
            .families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = config
            .required_device_extensions
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extensions: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::from_vk)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.families.present, 0) };

        log::info!("Created logical device ({} queue families)", queue_infos.len());

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Core Vulkan objects that outlive the swapchain
pub struct VulkanContext {
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: PresentationSurface,
    debug: Option<DebugReporter>,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Run the bootstrap stages up to and including the logical device
    pub fn new(window: &mut Window, config: &BootstrapConfig) -> Result<Self, RendererError> {
        let instance = VulkanInstance::new(window, config).stage(SetupStage::Instance)?;

        let debug = if instance.validation_enabled() {
            Some(DebugReporter::new(&instance).stage(SetupStage::DebugMessenger)?)
        } else {
            None
        };

        let surface = PresentationSurface::new(&instance, window).stage(SetupStage::Surface)?;

        let physical_device =
            PhysicalDeviceInfo::select(instance.instance(), &surface, config).stage(SetupStage::PhysicalDevice)?;

        let device =
            LogicalDevice::new(instance.instance(), &physical_device, config).stage(SetupStage::LogicalDevice)?;

        Ok(Self {
            device,
            physical_device,
            surface,
            debug,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        self.instance.instance()
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the presentation surface
    pub fn surface(&self) -> &PresentationSurface {
        &self.surface
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Queue family indices in use
    pub fn families(&self) -> QueueFamilies {
        self.physical_device.families
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Whether a debug messenger is installed
    pub fn has_debug_reporter(&self) -> bool {
        self.debug.is_some()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::from_vk) }
    }
}

/// Score used to order suitable devices; higher wins, ties keep enumeration order
pub fn rank_device(device_type: vk::PhysicalDeviceType, prefer_discrete: bool) -> u32 {
    if !prefer_discrete {
        return 1;
    }

    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        _ => 1,
    }
}

/// Find graphics and present families, preferring one family that does both
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> VulkanResult<Option<QueueFamilies>>
where
    F: FnMut(u32) -> VulkanResult<bool>,
{
    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0_u32..).zip(families) {
        let has_graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = supports_present(index)?;

        if has_graphics && has_present {
            return Ok(Some(QueueFamilies {
                graphics: index,
                present: index,
            }));
        }
        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if has_present && present.is_none() {
            present = Some(index);
        }
    }

    Ok(graphics.zip(present).map(|(graphics, present)| QueueFamilies { graphics, present }))
}

/// Required names absent from `available`
pub fn missing_names(required: &[String], available: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect()
}

/// Decode a fixed-size, NUL-terminated name from a properties struct
fn name_from_raw(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|_| VulkanError::InitializationFailed(format!("Name contains NUL: {value:?}")))
}
