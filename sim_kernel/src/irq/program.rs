//! Decoded and validated top-half programs

use hal::{IoSpace, IoWidth};
use kernel_api::{CmdRecord, IoOp, Opcode, ProgramError, MAX_PROGRAM_LEN, SCRATCH_LEN};

/// One decoded instruction
///
/// Scratch slots are already range-checked; `None` means "no slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Reads from hardware, optionally keeping the value
    Read {
        space: IoSpace,
        width: IoWidth,
        addr: usize,
        dst: Option<usize>,
    },
    /// Writes an immediate
    Write {
        space: IoSpace,
        width: IoWidth,
        addr: usize,
        value: u32,
    },
    /// Writes a scratch register
    WriteFromScratch {
        space: IoSpace,
        width: IoWidth,
        addr: usize,
        src: usize,
    },
    /// `scratch[dst] = scratch[src] & mask`
    BitTest { mask: u32, src: usize, dst: usize },
    /// Skips the next `skip` instructions when `scratch[src]` is zero
    Predicate { src: usize, skip: usize },
    Accept,
    Decline,
}

impl Cmd {
    /// Decodes record `index`, checking everything that does not depend
    /// on the rest of the program
    pub fn decode(index: usize, record: &CmdRecord) -> Result<Self, ProgramError> {
        let opcode = record.decode_opcode(index)?;

        if let Some((space, width, op)) = opcode.io() {
            if record.addr == 0 {
                return Err(ProgramError::MissingAddress { index });
            }
            let addr = record.addr;
            if space == IoSpace::Port && addr > usize::from(u16::MAX) {
                return Err(ProgramError::AddressOutOfRange { index, addr });
            }
            return Ok(match op {
                IoOp::Read => Cmd::Read {
                    space,
                    width,
                    addr,
                    dst: optional_slot(index, record.dstarg)?,
                },
                IoOp::Write => {
                    if !width.fits(record.value) {
                        return Err(ProgramError::ImmediateTooWide {
                            index,
                            value: record.value,
                            bits: width.bits(),
                        });
                    }
                    Cmd::Write {
                        space,
                        width,
                        addr,
                        value: record.value,
                    }
                }
                IoOp::WriteFromScratch => Cmd::WriteFromScratch {
                    space,
                    width,
                    addr,
                    src: required_slot(index, record.srcarg)?,
                },
            });
        }

        Ok(match opcode {
            Opcode::BitTest => Cmd::BitTest {
                mask: record.value,
                src: required_slot(index, record.srcarg)?,
                dst: required_slot(index, record.dstarg)?,
            },
            Opcode::Predicate => Cmd::Predicate {
                src: required_slot(index, record.srcarg)?,
                skip: record.value as usize,
            },
            Opcode::Accept => Cmd::Accept,
            Opcode::Decline => Cmd::Decline,
            // No decode rule yet.
            other => {
                return Err(ProgramError::UnknownOpcode {
                    index,
                    opcode: other.raw(),
                })
            }
        })
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Cmd::Accept | Cmd::Decline)
    }
}

fn optional_slot(index: usize, slot: usize) -> Result<Option<usize>, ProgramError> {
    match slot {
        0 => Ok(None),
        slot if slot < SCRATCH_LEN => Ok(Some(slot)),
        slot => Err(ProgramError::SlotOutOfRange { index, slot }),
    }
}

fn required_slot(index: usize, slot: usize) -> Result<usize, ProgramError> {
    optional_slot(index, slot)?.ok_or(ProgramError::MissingSlot { index })
}

/// A program that has passed validation
///
/// Every reachable path ends in `Accept` or `Decline` and every predicate
/// lands inside the program, so the interpreter never needs a bounds
/// check of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqProgram {
    cmds: Vec<Cmd>,
}

impl IrqProgram {
    /// Decodes and validates wire records
    pub fn from_records(records: &[CmdRecord]) -> Result<Self, ProgramError> {
        let cmds = records
            .iter()
            .enumerate()
            .map(|(index, record)| Cmd::decode(index, record))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(cmds)
    }

    /// Validates already-decoded instructions
    pub fn new(cmds: Vec<Cmd>) -> Result<Self, ProgramError> {
        if cmds.is_empty() {
            return Err(ProgramError::Empty);
        }
        if cmds.len() > MAX_PROGRAM_LEN {
            return Err(ProgramError::TooLong {
                len: cmds.len(),
                max: MAX_PROGRAM_LEN,
            });
        }
        for (index, cmd) in cmds.iter().enumerate() {
            match *cmd {
                Cmd::Read { dst: Some(slot), .. }
                | Cmd::WriteFromScratch { src: slot, .. }
                | Cmd::Predicate { src: slot, .. }
                    if slot == 0 || slot >= SCRATCH_LEN =>
                {
                    return Err(ProgramError::SlotOutOfRange { index, slot });
                }
                Cmd::BitTest { src, dst, .. } => {
                    for slot in [src, dst] {
                        if slot == 0 || slot >= SCRATCH_LEN {
                            return Err(ProgramError::SlotOutOfRange { index, slot });
                        }
                    }
                }
                Cmd::Predicate { skip, .. } if index + 1 + skip > cmds.len() => {
                    return Err(ProgramError::SkipOutOfBounds { index, skip });
                }
                _ => {}
            }
        }
        check_termination(&cmds)?;
        Ok(Self { cmds })
    }

    pub fn cmds(&self) -> &[Cmd] {
        &self.cmds
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }
}

/// Walks every path from the first instruction; jumps only go forward
fn check_termination(cmds: &[Cmd]) -> Result<(), ProgramError> {
    let mut reachable = vec![false; cmds.len()];
    reachable[0] = true;

    for pc in 0..cmds.len() {
        if !reachable[pc] || cmds[pc].is_terminal() {
            continue;
        }
        let mut successors = [Some(pc + 1), None];
        if let Cmd::Predicate { skip, .. } = cmds[pc] {
            successors[1] = Some(pc + 1 + skip);
        }
        for next in successors.into_iter().flatten() {
            if next >= cmds.len() {
                return Err(ProgramError::MissingTerminal { index: pc });
            }
            reachable[next] = true;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(opcode: Opcode) -> CmdRecord {
        CmdRecord::new(opcode)
    }

    #[test]
    fn test_decode_status_check() {
        let program = IrqProgram::from_records(&[
            rec(Opcode::PioRead8).addr(0x307).dst(1),
            rec(Opcode::BitTest).value(0x01).src(1).dst(2),
            rec(Opcode::Predicate).value(1).src(2),
            rec(Opcode::Accept),
            rec(Opcode::Decline),
        ])
        .unwrap();

        assert_eq!(program.len(), 5);
        assert_eq!(
            program.cmds()[0],
            Cmd::Read {
                space: IoSpace::Port,
                width: IoWidth::Bits8,
                addr: 0x307,
                dst: Some(1)
            }
        );
        assert_eq!(program.cmds()[2], Cmd::Predicate { src: 2, skip: 1 });
    }

    #[test]
    fn test_read_without_destination_is_allowed() {
        let program =
            IrqProgram::from_records(&[rec(Opcode::MemRead32).addr(0x1000), rec(Opcode::Accept)])
                .unwrap();
        assert!(matches!(program.cmds()[0], Cmd::Read { dst: None, .. }));
    }

    #[test]
    fn test_empty_and_oversized_programs() {
        assert_eq!(IrqProgram::from_records(&[]), Err(ProgramError::Empty));

        let mut records = vec![rec(Opcode::PioWrite8).addr(0x20).value(0x20); MAX_PROGRAM_LEN];
        records.push(rec(Opcode::Accept));
        assert_eq!(
            IrqProgram::from_records(&records),
            Err(ProgramError::TooLong {
                len: MAX_PROGRAM_LEN + 1,
                max: MAX_PROGRAM_LEN
            })
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let bad = CmdRecord {
            opcode: 0,
            ..CmdRecord::default()
        };
        assert_eq!(
            IrqProgram::from_records(&[rec(Opcode::Accept), bad]),
            Err(ProgramError::UnknownOpcode {
                index: 1,
                opcode: 0
            })
        );
    }

    #[test]
    fn test_io_without_address() {
        assert_eq!(
            IrqProgram::from_records(&[rec(Opcode::PioRead8).dst(1), rec(Opcode::Accept)]),
            Err(ProgramError::MissingAddress { index: 0 })
        );
    }

    #[test]
    fn test_port_address_must_fit_port_space() {
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::PioWrite8).addr(0x1_0020).value(0x20),
                rec(Opcode::Accept)
            ]),
            Err(ProgramError::AddressOutOfRange {
                index: 0,
                addr: 0x1_0020
            })
        );
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::Accept),
                rec(Opcode::PioRead16).addr(0x1_0000).dst(1)
            ]),
            Err(ProgramError::AddressOutOfRange {
                index: 1,
                addr: 0x1_0000
            })
        );
        // The top port and any memory address above it are fine.
        assert!(IrqProgram::from_records(&[
            rec(Opcode::PioRead8).addr(0xffff).dst(1),
            rec(Opcode::MemWrite8).addr(0x1_0020).value(0x20),
            rec(Opcode::Accept)
        ])
        .is_ok());
    }

    #[test]
    fn test_terminals_decode_to_themselves() {
        assert_eq!(Cmd::decode(0, &rec(Opcode::Accept)), Ok(Cmd::Accept));
        assert_eq!(Cmd::decode(4, &rec(Opcode::Decline)), Ok(Cmd::Decline));
    }

    #[test]
    fn test_slot_checks() {
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::PioRead8).addr(0x60).dst(SCRATCH_LEN),
                rec(Opcode::Accept)
            ]),
            Err(ProgramError::SlotOutOfRange {
                index: 0,
                slot: SCRATCH_LEN
            })
        );
        assert_eq!(
            IrqProgram::from_records(&[rec(Opcode::BitTest).value(1).dst(2), rec(Opcode::Accept)]),
            Err(ProgramError::MissingSlot { index: 0 })
        );
        assert_eq!(
            IrqProgram::from_records(&[rec(Opcode::PioWriteA8).addr(0x60), rec(Opcode::Accept)]),
            Err(ProgramError::MissingSlot { index: 0 })
        );
    }

    #[test]
    fn test_decoded_slots_are_rechecked() {
        assert_eq!(
            IrqProgram::new(vec![Cmd::Predicate { src: 0, skip: 0 }, Cmd::Accept]),
            Err(ProgramError::SlotOutOfRange { index: 0, slot: 0 })
        );
    }

    #[test]
    fn test_immediate_must_fit_width() {
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::PioWrite8).addr(0x307).value(0x100),
                rec(Opcode::Accept)
            ]),
            Err(ProgramError::ImmediateTooWide {
                index: 0,
                value: 0x100,
                bits: 8
            })
        );
        assert!(IrqProgram::from_records(&[
            rec(Opcode::MemWrite16).addr(0x2000).value(0xffff),
            rec(Opcode::Accept)
        ])
        .is_ok());
    }

    #[test]
    fn test_skip_past_end() {
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::Predicate).value(3).src(1),
                rec(Opcode::Accept),
                rec(Opcode::Decline),
            ]),
            Err(ProgramError::SkipOutOfBounds { index: 0, skip: 3 })
        );
    }

    #[test]
    fn test_skip_to_end_falls_off() {
        assert_eq!(
            IrqProgram::from_records(&[
                rec(Opcode::Predicate).value(1).src(1),
                rec(Opcode::Accept),
            ]),
            Err(ProgramError::MissingTerminal { index: 0 })
        );
    }

    #[test]
    fn test_missing_terminal_on_straight_path() {
        assert_eq!(
            IrqProgram::from_records(&[rec(Opcode::PioRead8).addr(0x60).dst(1)]),
            Err(ProgramError::MissingTerminal { index: 0 })
        );
    }

    #[test]
    fn test_unreachable_tail_is_not_checked() {
        let program = IrqProgram::new(vec![
            Cmd::Accept,
            Cmd::Read {
                space: IoSpace::Port,
                width: IoWidth::Bits8,
                addr: 0x60,
                dst: None,
            },
        ]);
        assert!(program.is_ok());
    }
}
