/// GpuContext - Shared GPU resources for all Vulkan objects
///
/// Contains everything needed for GPU operations:
/// - Instance and logical device
/// - Allocator for memory management
/// - Queue and command pool for one-shot submissions
///
/// Every resource holds an `Arc<GpuContext>`, so the device is destroyed only after
/// the last buffer, program or target referencing it is gone.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use render_test::{Error, RendererConfig, Result};
use render_test::{render_debug, render_err, render_error, render_info};
use std::mem::ManuallyDrop;
use std::sync::Mutex;

pub(crate) const LOG_SOURCE: &str = "render_test::vulkan";

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    /// Vulkan entry (library stays loaded as long as the context lives)
    _entry: ash::Entry,

    /// Vulkan instance (destroyed last)
    instance: ash::Instance,

    /// Selected physical device
    pub physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub device: ash::Device,

    /// Queue supporting graphics and compute
    pub queue: vk::Queue,

    /// Queue family index of `queue`
    pub queue_family: u32,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Command pool for one-shot submissions (guarded: pools need external sync)
    command_pool: Mutex<vk::CommandPool>,

    /// Signalled when a one-shot submission completes
    submit_fence: vk::Fence,

    /// Debug utils loader (for validation layers)
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    /// Human-readable device name
    pub device_name: String,
}

/// Map a Vulkan error into `InitializationFailed`, logging it
macro_rules! init_fail {
    ($($arg:tt)*) => {
        render_test::render_fail!(LOG_SOURCE, InitializationFailed, $($arg)*)
    };
}

impl GpuContext {
    /// Create an instance, pick a device and set up allocation and submission
    ///
    /// Rendering is always offscreen, so no surface or swapchain extension is requested.
    pub fn new(config: &RendererConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_fail!("Failed to load Vulkan library: {:?}", e))?;

            let app_name = std::ffi::CString::new(config.app_name.as_str())
                .map_err(|e| init_fail!("Invalid application name: {}", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"render-test")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_1);

            let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;
            let extension_names = if validation {
                vec![ash::ext::debug_utils::NAME.as_ptr()]
            } else {
                vec![]
            };
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_fail!("Failed to create Vulkan instance: {:?}", e))?;

            let (debug_utils_loader, debug_messenger) = if validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                crate::debug::init_debug_config(crate::debug::Config {
                    verbose: config.debug_output,
                    enable_stats: true,
                });

                let mut severity_flags = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
                if config.debug_output {
                    severity_flags |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
                }
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(severity_flags)
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => (Some(debug_utils), Some(messenger)),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(init_fail!("Failed to create debug messenger: {:?}", e));
                    }
                }
            } else {
                (None, None)
            };

            // From here on, partial failures are cleaned up by dropping `partial`
            let mut partial = PartialInstance {
                instance: Some(instance),
                debug_utils_loader,
                debug_messenger,
            };
            let instance = partial.instance()?;

            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| init_fail!("Failed to enumerate physical devices: {:?}", e))?;

            let mut selected = None;
            for physical_device in physical_devices {
                let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
                let family = queue_families.iter().position(|qf| {
                    qf.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                });
                if let Some(family) = family {
                    selected = Some((physical_device, family as u32));
                    break;
                }
            }
            let (physical_device, queue_family) = selected.ok_or_else(|| init_fail!("No Vulkan device with a graphics+compute queue found"))?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown device".to_string());

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_create_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_create_infos);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_fail!("Failed to create logical device: {:?}", e))?;
            let queue = device.get_device_queue(queue_family, 0);

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    return Err(init_fail!("Failed to create GPU allocator: {:?}", e));
                }
            };

            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = match device.create_command_pool(&pool_create_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    drop(allocator);
                    device.destroy_device(None);
                    return Err(init_fail!("Failed to create command pool: {:?}", e));
                }
            };

            let submit_fence = match device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    drop(allocator);
                    device.destroy_device(None);
                    return Err(init_fail!("Failed to create submit fence: {:?}", e));
                }
            };

            let (instance, debug_utils_loader, debug_messenger) = partial.release()?;

            render_info!(LOG_SOURCE, "Vulkan device selected: {} (queue family {})", device_name, queue_family);
            if validation {
                render_debug!(LOG_SOURCE, "validation layers enabled");
            }

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                queue,
                queue_family,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                command_pool: Mutex::new(command_pool),
                submit_fence,
                debug_utils_loader,
                debug_messenger,
                device_name,
            })
        }
    }

    /// Record commands into a fresh command buffer, submit and wait for completion
    pub fn submit_one_shot<F>(&self, label: &str, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self
            .command_pool
            .lock()
            .map_err(|_| render_err!(LOG_SOURCE, "{}: command pool lock poisoned", label))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to allocate command buffer: {:?}", label, e))?
                .into_iter()
                .next()
                .ok_or_else(|| render_err!(LOG_SOURCE, "{}: no command buffer allocated", label))?;

            let result = self.record_and_wait(label, command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait<F>(&self, label: &str, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to begin command buffer: {:?}", label, e))?;

        record(command_buffer);

        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to end command buffer: {:?}", label, e))?;

        self.device
            .reset_fences(&[self.submit_fence])
            .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to reset fence: {:?}", label, e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        self.device
            .queue_submit(self.queue, &[submit_info], self.submit_fence)
            .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to submit to GPU queue: {:?}", label, e))?;

        self.device
            .wait_for_fences(&[self.submit_fence], true, u64::MAX)
            .map_err(|e| render_err!(LOG_SOURCE, "{}: failed to wait for fence: {:?}", label, e))
    }

    /// Create a buffer and bind freshly allocated memory to it
    pub fn create_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<(vk::Buffer, Allocation)> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self
                .device
                .create_buffer(&create_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create {} of size {} bytes: {:?}", name, size, e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = self.allocate(name, requirements, location, true);
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free_allocation(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(render_err!(LOG_SOURCE, "Failed to bind {} memory: {:?}", name, e));
            }
            Ok((buffer, allocation))
        }
    }

    /// Allocate memory for the given requirements
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = self
            .allocator
            .lock()
            .map_err(|_| render_err!(LOG_SOURCE, "allocator lock poisoned"))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                render_error!(LOG_SOURCE, "Out of GPU memory for {} ({:.2} MB): {:?}", name, size_mb, e);
                Error::OutOfMemory
            })
    }

    /// Return memory to the allocator (never fails; used from Drop)
    pub fn free_allocation(&self, allocation: Allocation) {
        // Don't panic if lock fails - the handle still has to be destroyed by the caller
        if let Ok(mut allocator) = self.allocator.lock() {
            if let Err(e) = allocator.free(allocation) {
                render_error!(LOG_SOURCE, "Failed to free GPU allocation: {:?}", e);
            }
        }
    }

    /// Wait until the queue is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .queue_wait_idle(self.queue)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to wait for queue idle: {:?}", e))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            let pool = match self.command_pool.get_mut() {
                Ok(pool) => *pool,
                Err(poisoned) => *poisoned.into_inner(),
            };
            self.device.destroy_command_pool(pool, None);
            self.device.destroy_fence(self.submit_fence, None);

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            // Stop callbacks before the messenger goes away
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        render_debug!(LOG_SOURCE, "GPU context destroyed");
    }
}

/// Instance plus debug messenger, destroyed on drop unless released
struct PartialInstance {
    instance: Option<ash::Instance>,
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl PartialInstance {
    fn instance(&self) -> Result<&ash::Instance> {
        self.instance
            .as_ref()
            .ok_or_else(|| render_err!(LOG_SOURCE, "instance already released"))
    }

    #[allow(clippy::type_complexity)]
    fn release(
        &mut self,
    ) -> Result<(ash::Instance, Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        let instance = self
            .instance
            .take()
            .ok_or_else(|| render_err!(LOG_SOURCE, "instance already released"))?;
        Ok((instance, self.debug_utils_loader.take(), self.debug_messenger.take()))
    }
}

impl Drop for PartialInstance {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            unsafe {
                crate::debug::cleanup_debug_config();
                if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
                instance.destroy_instance(None);
            }
        }
    }
}

