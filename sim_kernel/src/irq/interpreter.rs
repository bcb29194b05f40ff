//! Top-half program interpreter

use super::program::{Cmd, IrqProgram};
use core_types::ProcessorId;
use hal::IoBus;
use kernel_api::{IrqOwnership, SCRATCH_LEN};

/// Runs `program` against `bus`, using `scratch` as its register file
///
/// Stops at the first `Accept` or `Decline`. Only `scratch` and the
/// hardware behind `bus` are touched.
pub fn run(
    cpu: ProcessorId,
    program: &IrqProgram,
    scratch: &mut [u32; SCRATCH_LEN],
    bus: &dyn IoBus,
) -> IrqOwnership {
    let cmds = program.cmds();
    let mut pc = 0;

    while let Some(cmd) = cmds.get(pc) {
        pc += 1;
        match *cmd {
            Cmd::Read {
                space,
                width,
                addr,
                dst,
            } => {
                let value = bus.read(space, width, addr);
                if let Some(dst) = dst {
                    scratch[dst] = value;
                }
            }
            Cmd::Write {
                space,
                width,
                addr,
                value,
            } => bus.write(space, width, addr, value),
            Cmd::WriteFromScratch {
                space,
                width,
                addr,
                src,
            } => bus.write(space, width, addr, scratch[src]),
            Cmd::BitTest { mask, src, dst } => scratch[dst] = scratch[src] & mask,
            Cmd::Predicate { src, skip } => {
                if scratch[src] == 0 {
                    pc += skip;
                }
            }
            Cmd::Accept => return IrqOwnership::Accept,
            Cmd::Decline => return IrqOwnership::Decline,
        }
    }

    fatal!(cpu, "interrupt program ran past its end at instruction {}", pc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::{FakeIoBus, IoAccess, IoSpace, IoWidth};
    use kernel_api::{CmdRecord, Opcode};

    const CPU: ProcessorId = ProcessorId(0);
    const STATUS: usize = 0x307;

    fn status_check(mask: u32) -> IrqProgram {
        IrqProgram::from_records(&[
            CmdRecord::new(Opcode::PioRead8).addr(STATUS).dst(1),
            CmdRecord::new(Opcode::BitTest).value(mask).src(1).dst(2),
            CmdRecord::new(Opcode::Predicate).value(1).src(2),
            CmdRecord::new(Opcode::Accept),
            CmdRecord::new(Opcode::Decline),
        ])
        .unwrap()
    }

    #[test]
    fn test_status_bit_set_accepts() {
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, STATUS, 0x01);
        let mut scratch = [0; SCRATCH_LEN];

        assert_eq!(
            run(CPU, &status_check(0x01), &mut scratch, &bus),
            IrqOwnership::Accept
        );
        assert_eq!(scratch[1], 0x01);
        assert_eq!(scratch[2], 0x01);
    }

    #[test]
    fn test_status_bit_clear_declines() {
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, STATUS, 0x00);
        let mut scratch = [0; SCRATCH_LEN];

        assert_eq!(
            run(CPU, &status_check(0x01), &mut scratch, &bus),
            IrqOwnership::Decline
        );
    }

    #[test]
    fn test_predicate_true_runs_acknowledgement() {
        // Read ISR, keep only the interesting bits, and write them back to
        // acknowledge. The write is skipped when none are set.
        let program = IrqProgram::from_records(&[
            CmdRecord::new(Opcode::PioRead8).addr(STATUS).dst(3),
            CmdRecord::new(Opcode::BitTest).value(0x15).src(3).dst(2),
            CmdRecord::new(Opcode::Predicate).value(2).src(2),
            CmdRecord::new(Opcode::PioWriteA8).addr(STATUS).src(2),
            CmdRecord::new(Opcode::Accept),
            CmdRecord::new(Opcode::Decline),
        ])
        .unwrap();

        let bus = FakeIoBus::new();
        bus.script_reads(IoSpace::Port, STATUS, &[0x35, 0x20]);
        let mut scratch = [0; SCRATCH_LEN];

        assert_eq!(run(CPU, &program, &mut scratch, &bus), IrqOwnership::Accept);
        assert_eq!(bus.writes(), vec![IoAccess::port(IoWidth::Bits8, STATUS, 0x15)]);

        bus.clear_log();
        assert_eq!(run(CPU, &program, &mut scratch, &bus), IrqOwnership::Decline);
        assert!(bus.writes().is_empty());
        assert_eq!(scratch[3], 0x20);
        assert_eq!(scratch[2], 0);
    }

    #[test]
    fn test_memory_space_and_widths() {
        let program = IrqProgram::from_records(&[
            CmdRecord::new(Opcode::MemRead32).addr(0x1000).dst(1),
            CmdRecord::new(Opcode::MemWrite16).addr(0x1004).value(0xbeef),
            CmdRecord::new(Opcode::MemWriteA32).addr(0x1008).src(1),
            CmdRecord::new(Opcode::Accept),
        ])
        .unwrap();

        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Memory, 0x1000, 0xdead_beef);
        let mut scratch = [0; SCRATCH_LEN];

        assert_eq!(run(CPU, &program, &mut scratch, &bus), IrqOwnership::Accept);
        assert_eq!(
            bus.writes(),
            vec![
                IoAccess::memory(IoWidth::Bits16, 0x1004, 0xbeef),
                IoAccess::memory(IoWidth::Bits32, 0x1008, 0xdead_beef),
            ]
        );
    }

    #[test]
    fn test_read_without_destination_still_touches_hardware() {
        let program = IrqProgram::from_records(&[
            CmdRecord::new(Opcode::PioRead16).addr(0x60),
            CmdRecord::new(Opcode::Decline),
        ])
        .unwrap();
        let bus = FakeIoBus::new();
        bus.set_register(IoSpace::Port, 0x60, 0xabcd);
        let mut scratch = [7; SCRATCH_LEN];

        run(CPU, &program, &mut scratch, &bus);
        assert_eq!(bus.reads(), vec![IoAccess::port(IoWidth::Bits16, 0x60, 0xabcd)]);
        assert_eq!(scratch, [7; SCRATCH_LEN]);
    }

    #[test]
    fn test_scratch_persists_between_runs() {
        let program = IrqProgram::from_records(&[
            CmdRecord::new(Opcode::PioWriteA8).addr(0x70).src(4),
            CmdRecord::new(Opcode::PioRead8).addr(0x71).dst(4),
            CmdRecord::new(Opcode::Accept),
        ])
        .unwrap();
        let bus = FakeIoBus::new();
        bus.script_reads(IoSpace::Port, 0x71, &[0x11, 0x22]);
        let mut scratch = [0; SCRATCH_LEN];

        run(CPU, &program, &mut scratch, &bus);
        run(CPU, &program, &mut scratch, &bus);

        let written: Vec<u32> = bus.writes().iter().map(|w| w.value).collect();
        assert_eq!(written, vec![0x00, 0x11]);
        assert_eq!(scratch[4], 0x22);
    }
}
