//! OpenCL device discovery and ordering.
//!
//! `discover()` enumerates every device of the first platform and returns a
//! [`DeviceCatalog`] ordered discrete GPUs first, then integrated GPUs, then
//! CPUs. Each group keeps the platform's enumeration order. The catalog is a
//! plain value: pass it to whatever needs to pick a device.

use std::ffi::c_void;
use std::fmt;

use crate::error::ClError;
use crate::ffi::{
    self, check_cl, info_scalar, info_string, ClBool, ClDeviceId, ClDeviceType, ClPlatformId,
    ClUint, ClUlong, CL_DEVICE_GLOBAL_MEM_SIZE, CL_DEVICE_HOST_UNIFIED_MEMORY,
    CL_DEVICE_MAX_COMPUTE_UNITS, CL_DEVICE_MAX_WORK_GROUP_SIZE, CL_DEVICE_NAME, CL_DEVICE_TYPE,
    CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_VENDOR,
};
use crate::status::StatusCode;

/// Device class used for catalog ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    DiscreteGpu,
    IntegratedGpu,
    Cpu,
}

impl DeviceKind {
    /// A CPU-type device is a CPU; anything else sharing host memory is an
    /// integrated GPU; everything left over counts as discrete.
    pub fn classify(device_type: ClDeviceType, host_unified_memory: bool) -> Self {
        if device_type & CL_DEVICE_TYPE_CPU != 0 {
            DeviceKind::Cpu
        } else if host_unified_memory {
            DeviceKind::IntegratedGpu
        } else {
            DeviceKind::DiscreteGpu
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::DiscreteGpu => write!(f, "discrete_gpu"),
            DeviceKind::IntegratedGpu => write!(f, "integrated_gpu"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Opaque OpenCL device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub(crate) ClDeviceId);

impl DeviceId {
    pub(crate) fn raw(self) -> ClDeviceId {
        self.0
    }
}

/// An enumerated compute device. Immutable once discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub(crate) id: DeviceId,
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
    pub compute_units: u32,
    pub max_work_group_size: usize,
    pub global_mem_bytes: u64,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Query the runtime for a device's attributes.
    fn from_id(id: ClDeviceId) -> Result<Self, ClError> {
        let api = ffi::opencl_api()?;
        let query = |param: ClUint| {
            move |size: usize, value: *mut c_void, size_ret: *mut usize| unsafe {
                (api.get_device_info)(id, param, size, value, size_ret)
            }
        };

        let device_type: ClDeviceType =
            unsafe { info_scalar(query(CL_DEVICE_TYPE), "clGetDeviceInfo(TYPE)")? };
        let unified: ClBool = unsafe {
            info_scalar(
                query(CL_DEVICE_HOST_UNIFIED_MEMORY),
                "clGetDeviceInfo(HOST_UNIFIED_MEMORY)",
            )?
        };
        let compute_units: ClUint = unsafe {
            info_scalar(query(CL_DEVICE_MAX_COMPUTE_UNITS), "clGetDeviceInfo(MAX_COMPUTE_UNITS)")?
        };
        let max_work_group_size: usize = unsafe {
            info_scalar(
                query(CL_DEVICE_MAX_WORK_GROUP_SIZE),
                "clGetDeviceInfo(MAX_WORK_GROUP_SIZE)",
            )?
        };
        let global_mem_bytes: ClUlong = unsafe {
            info_scalar(query(CL_DEVICE_GLOBAL_MEM_SIZE), "clGetDeviceInfo(GLOBAL_MEM_SIZE)")?
        };

        Ok(Device {
            id: DeviceId(id),
            name: info_string(query(CL_DEVICE_NAME), "clGetDeviceInfo(NAME)")?,
            vendor: info_string(query(CL_DEVICE_VENDOR), "clGetDeviceInfo(VENDOR)")?,
            kind: DeviceKind::classify(device_type, unified != 0),
            compute_units,
            max_work_group_size,
            global_mem_bytes,
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {} CUs, max work-group {}, {} MiB)",
            self.name,
            self.kind,
            self.vendor,
            self.compute_units,
            self.max_work_group_size,
            self.global_mem_bytes / (1024 * 1024),
        )
    }
}

/// Ordered list of devices returned by [`discover`].
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
}

impl DeviceCatalog {
    /// Order already-queried devices: discrete, integrated, CPU. The sort is
    /// stable, so enumeration order survives inside each group.
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut devices: Vec<Device> = devices.into_iter().collect();
        devices.sort_by_key(|d| d.kind);
        Self { devices }
    }

    /// Resolve an index into the ordered catalog.
    ///
    /// Out-of-range indices are rejected rather than silently replaced by
    /// device 0.
    pub fn select(&self, index: usize) -> Result<&Device, ClError> {
        self.devices.get(index).ok_or(ClError::InvalidDeviceIndex {
            index,
            count: self.devices.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }
}

/// Enumerate the devices of the first OpenCL platform.
///
/// Fails with [`ClError::NoDevices`] when there is no platform or the
/// platform reports zero devices.
pub fn discover() -> Result<DeviceCatalog, ClError> {
    let api = ffi::opencl_api()?;

    let mut platform: ClPlatformId = std::ptr::null_mut();
    let mut num_platforms: ClUint = 0;
    let code = unsafe { (api.get_platform_ids)(1, &mut platform, &mut num_platforms) };
    if code == StatusCode::PLATFORM_NOT_FOUND.0 || num_platforms == 0 {
        return Err(ClError::NoDevices);
    }
    check_cl(code, "clGetPlatformIDs")?;

    let mut count: ClUint = 0;
    let code = unsafe {
        (api.get_device_ids)(platform, CL_DEVICE_TYPE_ALL, 0, std::ptr::null_mut(), &mut count)
    };
    if code == StatusCode::DEVICE_NOT_FOUND.0 || count == 0 {
        return Err(ClError::NoDevices);
    }
    check_cl(code, "clGetDeviceIDs")?;

    let mut ids: Vec<ClDeviceId> = vec![std::ptr::null_mut(); count as usize];
    check_cl(
        unsafe {
            (api.get_device_ids)(
                platform,
                CL_DEVICE_TYPE_ALL,
                count,
                ids.as_mut_ptr(),
                std::ptr::null_mut(),
            )
        },
        "clGetDeviceIDs",
    )?;

    let devices = ids.into_iter().map(Device::from_id).collect::<Result<Vec<_>, _>>()?;
    let catalog = DeviceCatalog::from_devices(devices);
    tracing::debug!(count = catalog.len(), "discovered OpenCL devices");
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_GPU};

    fn fake(tag: usize, kind: DeviceKind) -> Device {
        Device {
            id: DeviceId(tag as ClDeviceId),
            name: format!("dev{tag}"),
            vendor: "test".into(),
            kind,
            compute_units: 1,
            max_work_group_size: 256,
            global_mem_bytes: 0,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(DeviceKind::classify(CL_DEVICE_TYPE_CPU, true), DeviceKind::Cpu);
        assert_eq!(DeviceKind::classify(CL_DEVICE_TYPE_GPU, true), DeviceKind::IntegratedGpu);
        assert_eq!(DeviceKind::classify(CL_DEVICE_TYPE_GPU, false), DeviceKind::DiscreteGpu);
        assert_eq!(
            DeviceKind::classify(CL_DEVICE_TYPE_ACCELERATOR, false),
            DeviceKind::DiscreteGpu
        );
    }

    #[test]
    fn test_catalog_order_preserves_enumeration_within_group() {
        use DeviceKind::*;
        let enumerated = vec![
            fake(1, Cpu),
            fake(2, IntegratedGpu),
            fake(3, DiscreteGpu),
            fake(4, Cpu),
            fake(5, DiscreteGpu),
            fake(6, IntegratedGpu),
        ];
        let catalog = DeviceCatalog::from_devices(enumerated);
        let names: Vec<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["dev3", "dev5", "dev2", "dev6", "dev1", "dev4"]);

        for (i, expected) in names.iter().enumerate() {
            assert_eq!(catalog.select(i).unwrap().name, *expected);
        }
    }

    #[test]
    fn test_select_out_of_range_is_rejected() {
        let catalog = DeviceCatalog::from_devices(vec![fake(1, DeviceKind::Cpu)]);
        match catalog.select(1) {
            Err(ClError::InvalidDeviceIndex { index, count }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("expected InvalidDeviceIndex, got {other:?}"),
        }
        assert!(matches!(
            DeviceCatalog::default().select(0),
            Err(ClError::InvalidDeviceIndex { count: 0, .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceKind::IntegratedGpu.to_string(), "integrated_gpu");
        let d = fake(7, DeviceKind::DiscreteGpu);
        assert!(d.to_string().starts_with("dev7 (discrete_gpu, test"));
    }
}
