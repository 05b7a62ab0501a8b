//! Reading machine memory in blocks while the CPU is frozen.

use super::traits::{DeviceCommands, DeviceResult};
use crate::error::DeviceCommandError;
use tracing::{debug, warn};

/// Largest read issued in one request
pub const DUMP_BLOCK_SIZE: u32 = 4096;

/// Size of the C64 address space
pub const FULL_DUMP_LENGTH: u32 = 0x1_0000;

/// Split `start..start + length` into `(address, length)` reads of at most `block` bytes.
/// The range is clipped at the top of memory.
pub fn dump_blocks(start: u16, length: u32, block: u32) -> Vec<(u16, u16)> {
    let end = (u32::from(start) + length).min(FULL_DUMP_LENGTH);
    let block = block.clamp(1, u32::from(u16::MAX));
    let mut blocks = Vec::new();
    let mut address = u32::from(start);
    while address < end {
        let size = block.min(end - address);
        blocks.push((address as u16, size as u16));
        address += size;
    }
    blocks
}

/// Pause the machine, read the range, then resume it whether or not the reads succeeded.
pub async fn dump_memory<D: DeviceCommands>(device: &D, start: u16, length: u32) -> DeviceResult<Vec<u8>> {
    device.pause().await?;
    let result = read_blocks(device, start, length).await;
    let resumed = device.resume().await;
    if let Err(e) = &resumed {
        warn!(error = %e, "Failed to resume after memory dump");
    }
    // A read error wins over a resume error
    let memory = result?;
    resumed?;
    Ok(memory)
}

async fn read_blocks<D: DeviceCommands>(device: &D, start: u16, length: u32) -> DeviceResult<Vec<u8>> {
    let mut memory = Vec::with_capacity(length as usize);
    for (address, size) in dump_blocks(start, length, DUMP_BLOCK_SIZE) {
        let bytes = device.read_memory(address, size).await?;
        if bytes.len() != size as usize {
            return Err(DeviceCommandError::Protocol {
                operation: format!("readmem ${:04X}", address),
                message: format!("short read: got {} of {} bytes", bytes.len(), size),
            });
        }
        debug!(address, size, "Read memory block");
        memory.extend_from_slice(&bytes);
    }
    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::fake::{timeout, Call, RecordingDevice};

    #[test]
    fn test_full_dump_is_sixteen_blocks() {
        let blocks = dump_blocks(0, FULL_DUMP_LENGTH, DUMP_BLOCK_SIZE);
        assert_eq!(blocks.len(), 16);
        assert_eq!(blocks[0], (0x0000, 4096));
        assert_eq!(blocks[15], (0xF000, 4096));
    }

    #[test]
    fn test_blocks_stop_at_top_of_memory() {
        let blocks = dump_blocks(0xFF00, 0x1000, DUMP_BLOCK_SIZE);
        assert_eq!(blocks, vec![(0xFF00, 0x100)]);

        let blocks = dump_blocks(0x0801, 5000, DUMP_BLOCK_SIZE);
        assert_eq!(blocks, vec![(0x0801, 4096), (0x1801, 904)]);
        assert!(dump_blocks(0x1000, 0, DUMP_BLOCK_SIZE).is_empty());
    }

    #[tokio::test]
    async fn test_dump_pauses_reads_and_resumes() {
        let device = RecordingDevice::new();
        device.reads.borrow_mut().push_back(vec![0xAB; 4096]);
        let memory = dump_memory(&device, 0xC000, 0x1800).await.unwrap();

        assert_eq!(memory.len(), 0x1800);
        assert!(memory[..4096].iter().all(|&b| b == 0xAB));
        assert_eq!(
            device.calls(),
            vec![
                Call::Pause,
                Call::ReadMemory(0xC000, 4096),
                Call::ReadMemory(0xD000, 2048),
                Call::Resume,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_read_still_resumes() {
        let device = RecordingDevice::new();
        device.fail("read_memory", timeout("readmem"));
        let result = dump_memory(&device, 0, FULL_DUMP_LENGTH).await;

        assert_eq!(result, Err(timeout("readmem")));
        assert_eq!(device.calls().last(), Some(&Call::Resume));
    }

    #[tokio::test]
    async fn test_short_read_is_a_protocol_error() {
        let device = RecordingDevice::new();
        device.reads.borrow_mut().push_back(vec![0; 10]);
        let result = dump_memory(&device, 0, 4096).await;

        assert!(matches!(result, Err(DeviceCommandError::Protocol { .. })));
        assert_eq!(device.calls().last(), Some(&Call::Resume));
    }

    #[tokio::test]
    async fn test_pause_failure_reads_nothing() {
        let device = RecordingDevice::new();
        device.fail("pause", timeout("pause"));
        assert!(dump_memory(&device, 0, 4096).await.is_err());
        assert_eq!(device.calls(), vec![Call::Pause]);
    }
}
