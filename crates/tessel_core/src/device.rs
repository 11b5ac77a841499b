#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    CPU,
}

impl Device {
    pub fn name(&self) -> String {
        match self {
            Device::CPU => "CPU".to_string(),
        }
    }

    /// Backend device id; the host is `-1`.
    pub fn id(&self) -> i32 {
        match self {
            Device::CPU => -1,
        }
    }

    /// Whether kernels on this device come from an accelerated library.
    /// Grouped convolution is only available there.
    pub fn is_accelerated(&self) -> bool {
        match self {
            Device::CPU => false,
        }
    }
}

thread_local! {
    static DEFAULT_DEVICE: std::cell::Cell<Device> = const { std::cell::Cell::new(Device::CPU) };
}

pub fn get_default_device() -> Device {
    DEFAULT_DEVICE.with(|d| d.get())
}

pub fn set_default_device(device: Device) {
    DEFAULT_DEVICE.with(|d| d.set(device));
}
