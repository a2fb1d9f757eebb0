//! DXGI Desktop Duplication capture (Windows 8+)
//!
//! D3D11 device -> DXGI adapter -> output -> `DuplicateOutput`. Each
//! grab acquires the next desktop frame with a bounded wait, copies the
//! GPU texture through a persistent staging texture into a persistent
//! CPU buffer, and releases the frame.

use crate::capture::{pack_rows, BgraFrame, CaptureError};
use log::info;
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BIND_FLAG,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_FLAG, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
    D3D11_RESOURCE_MISC_FLAG, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    IDXGIAdapter, IDXGIDevice, IDXGIOutput, IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource,
    DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO,
};

/// Bounded wait for a new desktop frame. On expiry the previous buffer
/// contents are returned unchanged (a static desktop is not an error).
const ACQUIRE_TIMEOUT_MS: u32 = 100;

pub struct DxgiCapture {
    duplication: IDXGIOutputDuplication,
    staging: ID3D11Texture2D,
    context: ID3D11DeviceContext,
    _device: ID3D11Device,
    width: u32,
    height: u32,
    /// Persistent tightly packed BGRA copy of the last acquired frame.
    buffer: Vec<u8>,
}

impl DxgiCapture {
    pub(super) fn open() -> Result<Self, CaptureError> {
        let open_err = |what: &str, e: windows::core::Error| {
            CaptureError::DisplayUnavailable(format!("{}: {}", what, e))
        };

        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_FLAG(0),
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| open_err("D3D11CreateDevice", e))?;
        let device = device
            .ok_or_else(|| CaptureError::DisplayUnavailable("no D3D11 device".to_string()))?;
        let context = context
            .ok_or_else(|| CaptureError::DisplayUnavailable("no D3D11 context".to_string()))?;

        let dxgi_device: IDXGIDevice =
            device.cast().map_err(|e| open_err("IDXGIDevice", e))?;
        let adapter: IDXGIAdapter =
            unsafe { dxgi_device.GetAdapter() }.map_err(|e| open_err("GetAdapter", e))?;
        let output: IDXGIOutput = unsafe { adapter.EnumOutputs(0) }
            .map_err(|_| CaptureError::DisplayUnavailable("no display output found".to_string()))?;

        let desc = unsafe { output.GetDesc() }.map_err(|e| open_err("GetDesc", e))?;
        let width = (desc.DesktopCoordinates.right - desc.DesktopCoordinates.left) as u32;
        let height = (desc.DesktopCoordinates.bottom - desc.DesktopCoordinates.top) as u32;

        let output1: IDXGIOutput1 = output.cast().map_err(|_| {
            CaptureError::DisplayUnavailable(
                "Desktop Duplication requires Windows 8 or later".to_string(),
            )
        })?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }.map_err(|e| {
            CaptureError::DisplayUnavailable(format!(
                "DuplicateOutput: {} (is another app using Desktop Duplication?)",
                e
            ))
        })?;

        let staging = create_staging_texture(&device, width, height)
            .map_err(|e| open_err("CreateTexture2D(staging)", e))?;
        let buffer = vec![0u8; width as usize * height as usize * 4];

        info!("capture: {}x{} (DXGI Desktop Duplication)", width, height);
        Ok(Self { duplication, staging, context, _device: device, width, height, buffer })
    }

    pub(super) fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(super) fn grab(&mut self) -> Result<BgraFrame<'_>, CaptureError> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let acquired = unsafe {
            self.duplication
                .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut resource)
        };

        match acquired {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                // No new frame within the window; desktop is static
                return Ok(self.frame());
            }
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => {
                return Err(CaptureError::AccessLost);
            }
            Err(e) => {
                return Err(CaptureError::Transient(format!("AcquireNextFrame: {}", e)));
            }
        }

        let copied = self.copy_acquired(resource);
        unsafe {
            let _ = self.duplication.ReleaseFrame();
        }
        copied?;
        Ok(self.frame())
    }

    /// Pull the acquired GPU frame into `self.buffer` via the staging
    /// texture, packing out any row-pitch padding.
    fn copy_acquired(&mut self, resource: Option<IDXGIResource>) -> Result<(), CaptureError> {
        let resource = resource
            .ok_or_else(|| CaptureError::Transient("no desktop resource".to_string()))?;
        let texture: ID3D11Texture2D = resource
            .cast()
            .map_err(|e| CaptureError::Transient(format!("ID3D11Texture2D: {}", e)))?;

        unsafe { self.context.CopyResource(&self.staging, &texture) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| CaptureError::Transient(format!("Map(staging): {}", e)))?;

        let pitch = mapped.RowPitch as usize;
        let height = self.height as usize;
        let row_bytes = self.width as usize * 4;
        let src = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, pitch * height) };
        pack_rows(src, pitch, row_bytes, height, &mut self.buffer);

        unsafe { self.context.Unmap(&self.staging, 0) };
        Ok(())
    }

    fn frame(&self) -> BgraFrame<'_> {
        BgraFrame {
            data: &self.buffer,
            width: self.width,
            height: self.height,
            stride: self.width as usize * 4,
        }
    }
}

/// CPU-readable staging texture matching the output (BGRA8).
fn create_staging_texture(
    device: &ID3D11Device,
    width: u32,
    height: u32,
) -> windows::core::Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: D3D11_BIND_FLAG(0),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ,
        MiscFlags: D3D11_RESOURCE_MISC_FLAG(0),
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture))? };
    texture.ok_or_else(|| windows::core::Error::from_win32())
}
