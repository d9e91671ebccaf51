//! Adapter enumeration and device/queue creation (§4.14, ambient —
//! spec.md §1 places this out of scope as an external collaborator, but a
//! buildable backend needs a concrete implementation behind it).
//!
//! Grounded in `original_source/d3d12/Adapter.cc` (enumeration +
//! `DXGI_GPU_PREFERENCE` mapping) and `onca_ral_dx12::device::Device::new`
//! (device + per-queue-kind `ID3D12CommandQueue` creation).

use gfx_ral_core::config::Config;
use gfx_ral_core::state::{AdapterPreference, QueueKind, ValidationLevel};
use gfx_ral_core::{Error, Result};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_12_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::utils::ToRalError;

pub struct Device {
    pub device: ID3D12Device10,
    pub direct_queue: ID3D12CommandQueue,
    pub compute_queue: ID3D12CommandQueue,
    pub copy_queue: ID3D12CommandQueue,
    /// Kept for swapchain creation (`CreateSwapChainForHwnd` needs the
    /// factory that enumerated the adapter this device was created from).
    pub factory: IDXGIFactory6,
}

impl Device {
    pub fn new(config: &Config) -> Result<Self> {
        unsafe {
            if !matches!(config.validation, ValidationLevel::Off) {
                enable_debug_layer(config.validation)?;
            }

            let factory: IDXGIFactory6 = CreateDXGIFactory2(if matches!(config.validation, ValidationLevel::Off) { 0 } else { DXGI_CREATE_FACTORY_DEBUG })
                .map_err(|e| e.to_ral_error("CreateDXGIFactory2"))?;

            let adapter = choose_adapter(&factory, config.adapter)?;

            let mut device: Option<ID3D12Device10> = None;
            D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_0, &mut device).map_err(|e| e.to_ral_error("D3D12CreateDevice"))?;
            let device = device.ok_or_else(|| Error::Api { what: "D3D12CreateDevice", detail: "no device returned".into() })?;

            let direct_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_DIRECT)?;
            let compute_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_COMPUTE)?;
            let copy_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_COPY)?;

            log::info!(target: "gfx_ral::device", "D3D12 device created (validation: {:?})", config.validation);

            Ok(Self { device, direct_queue, compute_queue, copy_queue, factory })
        }
    }

    pub fn queue(&self, kind: QueueKind) -> &ID3D12CommandQueue {
        match kind {
            QueueKind::Direct => &self.direct_queue,
            QueueKind::Compute => &self.compute_queue,
            QueueKind::Copy => &self.copy_queue,
        }
    }
}

unsafe fn enable_debug_layer(level: ValidationLevel) -> Result<()> {
    let mut debug: Option<ID3D12Debug1> = None;
    D3D12GetDebugInterface(&mut debug).map_err(|e| e.to_ral_error("D3D12GetDebugInterface"))?;
    if let Some(debug) = debug {
        debug.EnableDebugLayer();
        if matches!(level, ValidationLevel::OnExtended | ValidationLevel::OnExtendedDred) {
            debug.SetEnableGPUBasedValidation(true);
        }
    }
    Ok(())
}

unsafe fn create_queue(device: &ID3D12Device10, kind: D3D12_COMMAND_LIST_TYPE) -> Result<ID3D12CommandQueue> {
    let desc = D3D12_COMMAND_QUEUE_DESC { Type: kind, Priority: 0, Flags: D3D12_COMMAND_QUEUE_FLAG_NONE, NodeMask: 0 };
    device.CreateCommandQueue(&desc).map_err(|e| e.to_ral_error("CreateCommandQueue"))
}

unsafe fn choose_adapter(factory: &IDXGIFactory6, preference: AdapterPreference) -> Result<IDXGIAdapter1> {
    let gpu_preference = match preference {
        AdapterPreference::HighestVram | AdapterPreference::HighestFeatureLevel => DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
        AdapterPreference::Integrated => DXGI_GPU_PREFERENCE_MINIMUM_POWER,
        AdapterPreference::First | AdapterPreference::ExplicitIndex(_) => DXGI_GPU_PREFERENCE_UNSPECIFIED,
    };

    let explicit_index = match preference {
        AdapterPreference::ExplicitIndex(i) => Some(i),
        _ => None,
    };

    for i in 0.. {
        let index = explicit_index.unwrap_or(i);
        let adapter: IDXGIAdapter1 = match factory.EnumAdapterByGpuPreference(index, gpu_preference) {
            Ok(a) => a,
            Err(_) => break,
        };
        let desc = adapter.GetDesc1().map_err(|e| e.to_ral_error("IDXGIAdapter1::GetDesc1"))?;
        if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
            if explicit_index.is_some() {
                break;
            }
            continue;
        }
        return Ok(adapter);
    }
    Err(Error::Api { what: "adapter enumeration", detail: "no suitable hardware adapter found".into() })
}
