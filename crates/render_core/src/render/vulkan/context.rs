//! Vulkan device context
//!
//! Owns the instance, optional presentation surface, the selected physical
//! device and the logical device with its queues. Every other Vulkan object in
//! the crate borrows its handles from here and must be dropped first.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

use crate::core::DeviceConfig;
use crate::render::vulkan::surface::SurfaceProvider;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(#[from] vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device satisfies the requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type matches the filter and property flags
    #[error("No suitable memory type found (filter {type_filter:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        /// Memory type bitmask from the resource requirements
        type_filter: u32,
        /// Required property flags
        properties: vk::MemoryPropertyFlags,
    },

    /// Layout pair missing from the transition table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// None of the candidate formats supports the required features
    #[error("No supported format among candidates for {features:?}")]
    UnsupportedFormat {
        /// Features that had to be supported
        features: vk::FormatFeatureFlags,
    },

    /// The descriptor pool has no capacity left
    #[error("Descriptor pool exhausted")]
    DescriptorPoolExhausted,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the given extensions, adding validation when requested
    pub fn new(config: &DeviceConfig, required_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = to_cstring(&config.application_name)?;
        let engine_name = to_cstring("render_core")?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation = config.enable_validation && Self::validation_layer_available(&entry)?;
        if config.enable_validation && !validation {
            log::warn!("{} requested but not available, continuing without it", VALIDATION_LAYER);
        }

        let mut extension_names = required_extensions
            .iter()
            .map(|ext| to_cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if validation { vec![to_cstring(VALIDATION_LAYER)?] } else { Vec::new() };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug_utils = if validation {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Created Vulkan instance ({} extensions, validation {})",
            extension_ptrs.len(),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties()?;
        Ok(layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_bytes() == VALIDATION_LAYER.as_bytes()
        }))
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
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

        Ok(unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? })
    }

    /// Vulkan entry point
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Vulkan instance
    pub const fn handle(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
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
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr((*callback_data).p_message) }.to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|e| VulkanError::InitializationFailed(format!("Invalid name {value:?}: {e}")))
}

/// Queue family indices used by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for graphics and transfer work
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick the first graphics-capable family and the first present-capable family
    ///
    /// Returns `None` when either is missing.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> VulkanResult<Option<Self>>
    where
        F: FnMut(u32) -> VulkanResult<bool>,
    {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in (0u32..).zip(families) {
            if graphics.is_none() && family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(index);
            }
            if present.is_none() && supports_present(index)? {
                present = Some(index);
            }
            if graphics.is_some() && present.is_some() {
                break;
            }
        }

        Ok(graphics.zip(present).map(|(graphics, present)| Self { graphics, present }))
    }

    /// Whether graphics and presentation use one family
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, ascending
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Highest sample count supported by both color and depth framebuffers
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose tiling features contain `features`
pub fn select_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    format_properties: F,
) -> Option<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        let props = format_properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Whether a depth format carries a stencil aspect
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(format, vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT)
}

/// Selected physical device and its cached properties
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub handle: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families chosen for graphics and presentation
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the first device that satisfies the requirements
    ///
    /// With a surface the device must also be able to present to it and
    /// support `VK_KHR_swapchain`.
    pub fn select(instance: &Instance, surface: Option<(&Surface, vk::SurfaceKHR)>) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        for device in devices {
            if let Some(info) = Self::evaluate(instance, device, surface)? {
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(info);
            }
        }

        Err(VulkanError::NoSuitableDevice)
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(&Surface, vk::SurfaceKHR)>,
    ) -> VulkanResult<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_families = match surface {
            Some((loader, surface)) => QueueFamilyIndices::find(&families, |index| {
                Ok(unsafe { loader.get_physical_device_surface_support(device, index, surface)? })
            })?,
            None => QueueFamilyIndices::find(&families, |index| {
                Ok(families[index as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS))
            })?,
        };

        let Some(queue_families) = queue_families else {
            return Ok(None);
        };

        if features.sampler_anisotropy == vk::FALSE {
            return Ok(None);
        }

        if let Some((loader, surface)) = surface {
            if !Self::supports_swapchain_extension(instance, device)? {
                return Ok(None);
            }
            let formats = unsafe { loader.get_physical_device_surface_formats(device, surface)? };
            let present_modes = unsafe { loader.get_physical_device_surface_present_modes(device, surface)? };
            if formats.is_empty() || present_modes.is_empty() {
                return Ok(None);
            }
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Some(Self {
            handle: device,
            properties,
            memory_properties,
            queue_families,
        }))
    }

    fn supports_swapchain_extension(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<bool> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
        Ok(extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        }))
    }
}

/// Instance, device and queues shared by every other component
pub struct DeviceContext {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: Option<SwapchainLoader>,
    physical_device: PhysicalDeviceInfo,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Create a context that can present to the provider's surface
    pub fn new<P: SurfaceProvider + ?Sized>(config: &DeviceConfig, provider: &mut P) -> VulkanResult<Self> {
        let extensions = provider.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &extensions)?;

        let surface_loader = Surface::new(instance.entry(), instance.handle());
        let surface = provider.create_surface(instance.handle())?;

        let physical_device = match PhysicalDeviceInfo::select(instance.handle(), Some((&surface_loader, surface))) {
            Ok(info) => info,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let device = match Self::create_logical_device(instance.handle(), &physical_device, true) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let swapchain_loader = SwapchainLoader::new(instance.handle(), &device);

        Ok(Self::assemble(instance, surface_loader, surface, physical_device, device, Some(swapchain_loader)))
    }

    /// Create a context without a surface for offscreen transfer work
    pub fn headless(config: &DeviceConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(config, &[])?;
        let surface_loader = Surface::new(instance.entry(), instance.handle());
        let physical_device = PhysicalDeviceInfo::select(instance.handle(), None)?;
        let device = Self::create_logical_device(instance.handle(), &physical_device, false)?;

        Ok(Self::assemble(instance, surface_loader, vk::SurfaceKHR::null(), physical_device, device, None))
    }

    fn assemble(
        instance: VulkanInstance,
        surface_loader: Surface,
        surface: vk::SurfaceKHR,
        physical_device: PhysicalDeviceInfo,
        device: Device,
        swapchain_loader: Option<SwapchainLoader>,
    ) -> Self {
        let families = physical_device.queue_families;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            physical_device,
            surface_loader,
            surface,
            instance,
        }
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        with_swapchain: bool,
    ) -> VulkanResult<Device> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = physical_device
            .queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = if with_swapchain {
            vec![SwapchainLoader::name().as_ptr()]
        } else {
            Vec::new()
        };

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&device_features);

        Ok(unsafe { instance.create_device(physical_device.handle, &create_info, None)? })
    }

    /// Vulkan instance
    pub const fn instance(&self) -> &Instance {
        self.instance.handle()
    }

    /// Logical device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Selected physical device
    pub const fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Queue families in use
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Graphics queue, also used for transfers
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Presentation queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Presentation surface, null for headless contexts
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub const fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.swapchain_loader.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no swapchain support".to_string(),
        })
    }

    /// Memory heaps and types of the selected device
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Format properties of the selected device
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .handle()
                .get_physical_device_format_properties(self.physical_device.handle, format)
        }
    }

    /// Preferred depth attachment format
    pub fn find_depth_format(&self) -> VulkanResult<vk::Format> {
        let features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        select_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, features, |format| {
            self.format_properties(format)
        })
        .ok_or(VulkanError::UnsupportedFormat { features })
    }

    /// Highest sample count usable for both color and depth
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        max_usable_sample_count(&self.physical_device.properties.limits)
    }

    /// Maximum sampler anisotropy
    pub const fn max_sampler_anisotropy(&self) -> f32 {
        self.physical_device.properties.limits.max_sampler_anisotropy
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
        }
        // `instance` is dropped after this body, destroying the messenger and instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_families_first_match_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let found = QueueFamilyIndices::find(&families, |index| Ok(index >= 1)).unwrap().unwrap();
        assert_eq!(found, QueueFamilyIndices { graphics: 1, present: 1 });
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![1]);
    }

    #[test]
    fn test_queue_families_split() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        let found = QueueFamilyIndices::find(&families, |index| Ok(index == 1)).unwrap().unwrap();
        assert_eq!(found, QueueFamilyIndices { graphics: 0, present: 1 });
        assert!(!found.is_shared());
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn test_queue_families_missing_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap().is_none());
    }

    #[test]
    fn test_max_usable_sample_count_uses_intersection() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);

        let single = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&single), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_depth_format_selection_skips_unsupported() {
        let selected = select_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| vk::FormatProperties {
                optimal_tiling_features: if format == vk::Format::D24_UNORM_S8_UINT {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::FormatFeatureFlags::empty()
                },
                ..Default::default()
            },
        );
        assert_eq!(selected, Some(vk::Format::D24_UNORM_S8_UINT));

        let none = select_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties::default(),
        );
        assert_eq!(none, None);
    }

    #[test]
    fn test_stencil_component() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }
}
