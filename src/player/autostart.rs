//! Disk autostart strategies, run after mount + reboot.
//!
//! Both strategies end by typing into the KERNAL keyboard buffer; they differ
//! in whether the program comes off the virtual drive (classic) or is written
//! into RAM up front (DMA).

use super::disk::{extract_first_program, ExtractedProgram};
use super::plan::{AutostartMode, PlanStep, PlayRequest};
use super::traits::Drive;
use crate::error::DiskParseError;
use tracing::{debug, warn};

/// KERNAL keyboard buffer and its fill count
pub const KEYBOARD_BUFFER: u16 = 0x0277;
pub const KEYBOARD_COUNT: u16 = 0x00C6;
pub const KEYBOARD_BUFFER_SIZE: usize = 10;

pub const BASIC_START: u16 = 0x0801;
/// VARTAB, ARYTAB, STREND: all point just past the program after a load
const BASIC_END_POINTERS: u16 = 0x002D;
/// Zero page and stack are off limits
const LOWEST_LOAD_ADDRESS: u16 = 0x0200;
/// One past the last addressable byte
const ADDRESS_SPACE: u32 = 0x1_0000;

/// `LOAD"*",<dev>,1:RUN` + RETURN
pub fn load_command(drive: Drive) -> Vec<u8> {
    format!("LOAD\"*\",{},1:RUN\r", drive.device_number()).into_bytes()
}

/// `RUN` for BASIC programs, `SYS <addr>` for machine code
pub fn start_command(load_address: u16) -> Vec<u8> {
    if load_address == BASIC_START {
        b"RUN\r".to_vec()
    } else {
        format!("SYS {}\r", load_address).into_bytes()
    }
}

/// Type `text` through the keyboard buffer, one buffer-full at a time.
/// Each chunk waits for the KERNAL to drain the previous one.
pub fn type_text(text: &[u8]) -> Vec<PlanStep> {
    text.chunks(KEYBOARD_BUFFER_SIZE)
        .flat_map(|chunk| {
            [
                PlanStep::ReadMemory {
                    address: KEYBOARD_COUNT,
                    length: 1,
                },
                PlanStep::WriteMemory {
                    address: KEYBOARD_BUFFER,
                    bytes: chunk.to_vec(),
                },
                PlanStep::WriteMemory {
                    address: KEYBOARD_COUNT,
                    bytes: vec![chunk.len() as u8],
                },
            ]
        })
        .collect()
}

pub fn classic_steps(drive: Drive) -> Vec<PlanStep> {
    type_text(&load_command(drive))
}

/// Write the program to its load address, fix up BASIC's pointers and start it
pub fn dma_steps(program: &ExtractedProgram) -> Result<Vec<PlanStep>, DiskParseError> {
    let end = program.end_address();
    if program.load_address < LOWEST_LOAD_ADDRESS || end > ADDRESS_SPACE {
        return Err(DiskParseError::LoadRange {
            load_address: program.load_address,
            length: program.payload.len(),
        });
    }

    let mut steps = vec![
        PlanStep::ReadMemory {
            address: KEYBOARD_COUNT,
            length: 1,
        },
        PlanStep::WriteMemory {
            address: program.load_address,
            bytes: program.payload.clone(),
        },
    ];

    if program.load_address == BASIC_START {
        let [lo, hi] = (end as u16).to_le_bytes();
        steps.push(PlanStep::WriteMemory {
            address: BASIC_END_POINTERS,
            bytes: vec![lo, hi, lo, hi, lo, hi],
        });
    }

    steps.extend(type_text(&start_command(program.load_address)));
    Ok(steps)
}

/// Autostart steps for `mode`. DMA falls back to classic whenever the image
/// cannot be used; the failure is logged, never propagated.
pub fn steps(mode: AutostartMode, request: &PlayRequest, drive: Drive) -> Vec<PlanStep> {
    match mode {
        AutostartMode::Classic => classic_steps(drive),
        AutostartMode::Dma => {
            let Some(bytes) = request.bytes.as_deref() else {
                warn!(path = %request.path, "No image bytes for DMA autostart, using classic load");
                return classic_steps(drive);
            };

            match extract_first_program(request.file_name(), bytes).and_then(|p| {
                debug!(
                    name = %p.name,
                    load_address = p.load_address,
                    length = p.payload.len(),
                    "Extracted program for DMA autostart"
                );
                dma_steps(&p)
            }) {
                Ok(steps) => steps,
                Err(e) => {
                    warn!(path = %request.path, error = %e, "DMA autostart unavailable, using classic load");
                    classic_steps(drive)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::disk::tests::sample_d64;

    fn written_text(steps: &[PlanStep]) -> Vec<u8> {
        steps
            .iter()
            .filter_map(|step| match step {
                PlanStep::WriteMemory { address, bytes } if *address == KEYBOARD_BUFFER => {
                    Some(bytes.clone())
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_classic_types_load_run_in_buffer_sized_chunks() {
        let steps = classic_steps(Drive::A);
        assert_eq!(written_text(&steps), b"LOAD\"*\",8,1:RUN\r".to_vec());

        // 16 characters → two chunks of (poll, text, count)
        assert_eq!(steps.len(), 6);
        for chunk in steps.chunks(3) {
            assert!(matches!(chunk[0], PlanStep::ReadMemory { address: KEYBOARD_COUNT, .. }));
            let PlanStep::WriteMemory { bytes: text, .. } = &chunk[1] else {
                panic!("expected keyboard write");
            };
            assert!(text.len() <= KEYBOARD_BUFFER_SIZE);
            assert_eq!(
                chunk[2],
                PlanStep::WriteMemory {
                    address: KEYBOARD_COUNT,
                    bytes: vec![text.len() as u8]
                }
            );
        }
    }

    #[test]
    fn test_start_command() {
        assert_eq!(start_command(0x0801), b"RUN\r".to_vec());
        assert_eq!(start_command(0xC000), b"SYS 49152\r".to_vec());
        assert!(start_command(0xFFFF).len() <= KEYBOARD_BUFFER_SIZE);
    }

    #[test]
    fn test_dma_basic_program_sets_pointers() {
        let program = ExtractedProgram {
            name: "HELLO".to_string(),
            load_address: 0x0801,
            payload: vec![0xAA; 0x100],
        };
        let steps = dma_steps(&program).unwrap();

        assert_eq!(
            steps[1],
            PlanStep::WriteMemory {
                address: 0x0801,
                bytes: vec![0xAA; 0x100]
            }
        );
        assert_eq!(
            steps[2],
            PlanStep::WriteMemory {
                address: BASIC_END_POINTERS,
                bytes: vec![0x01, 0x09, 0x01, 0x09, 0x01, 0x09]
            }
        );
        assert_eq!(written_text(&steps), b"RUN\r".to_vec());
    }

    #[test]
    fn test_dma_machine_code_uses_sys() {
        let program = ExtractedProgram {
            name: "INTRO".to_string(),
            load_address: 0xC000,
            payload: vec![0x60],
        };
        let steps = dma_steps(&program).unwrap();
        assert!(!steps.iter().any(|s| matches!(
            s,
            PlanStep::WriteMemory { address: BASIC_END_POINTERS, .. }
        )));
        assert_eq!(written_text(&steps), b"SYS 49152\r".to_vec());
    }

    #[test]
    fn test_dma_rejects_programs_outside_ram() {
        let low = ExtractedProgram {
            name: String::new(),
            load_address: 0x0100,
            payload: vec![0; 4],
        };
        assert!(matches!(dma_steps(&low), Err(DiskParseError::LoadRange { .. })));

        let wraps = ExtractedProgram {
            name: String::new(),
            load_address: 0xFF00,
            payload: vec![0; 0x200],
        };
        assert!(matches!(dma_steps(&wraps), Err(DiskParseError::LoadRange { .. })));
    }

    #[test]
    fn test_dma_accepts_program_ending_at_top_of_memory() {
        let program = ExtractedProgram {
            name: String::new(),
            load_address: 0xFF00,
            payload: vec![0; 0x100],
        };
        let steps = dma_steps(&program).unwrap();
        assert_eq!(
            steps[1],
            PlanStep::WriteMemory {
                address: 0xFF00,
                bytes: vec![0; 0x100]
            }
        );
    }

    #[test]
    fn test_dma_falls_back_without_bytes() {
        let request = PlayRequest::remote("/USB0/disk.d64");
        assert_eq!(steps(AutostartMode::Dma, &request, Drive::A), classic_steps(Drive::A));
    }

    #[test]
    fn test_dma_uses_decoded_image() {
        let request = PlayRequest::local("game.d64", sample_d64(0x0801));
        let steps = steps(AutostartMode::Dma, &request, Drive::A);
        assert_ne!(steps, classic_steps(Drive::A));
        assert_eq!(written_text(&steps), b"RUN\r".to_vec());
    }
}
