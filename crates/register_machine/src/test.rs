use super::*;
use alloc::vec;
use alloc::vec::Vec;
use alloc::string::ToString;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

use crate::Instruction::{
    Add, AddImmediate, Call, Decrement, Increment, Move, MoveImmediate, Return,
};

fn movi(destination_register: RegisterIndex, value: Register) -> Instruction {
    MoveImmediate {
        destination_register,
        value,
    }
}

fn mov(destination_register: RegisterIndex, source_register: RegisterIndex) -> Instruction {
    Move {
        destination_register,
        source_register,
    }
}

fn add(destination_register: RegisterIndex, source_register: RegisterIndex) -> Instruction {
    Add {
        destination_register,
        source_register,
    }
}

fn addi(destination_register: RegisterIndex, value: Register) -> Instruction {
    AddImmediate {
        destination_register,
        value,
    }
}

fn call(target_pc: ProgramCounter, frame_size: usize, destination_register: RegisterIndex) -> Instruction {
    Call {
        target_pc,
        frame_size,
        destination_register,
    }
}

fn run(program: &[Instruction], root_window_size: usize) -> Result<Register, MachineError> {
    let mut machine = Machine::new(program, DEFAULT_REGISTER_CAPACITY)?;
    machine.execute(0, root_window_size)
}

/// A chain of `depth` nested calls below the root, three registers per frame.
/// Every frame stores `marker(level)` in its r1, takes its callee's result
/// into r2 and returns r1 + r2. The innermost frame returns 1.
fn nested_chain(depth: usize) -> Vec<Instruction> {
    let mut program = Vec::new();
    for level in 0..depth {
        let callee = (level + 1) * 5;
        program.extend([
            addi(1, marker(level)),
            call(callee, 3, 2),
            add(0, 1),
            add(0, 2),
            Return,
        ]);
    }
    program.extend([addi(0, 1), Return]);
    program
}

fn marker(level: usize) -> Register {
    1000 + level * 10
}

fn chain_result(depth: usize) -> Register {
    (0..depth).map(marker).sum::<Register>() + 1
}

proptest! {
    #[test]
    fn prop_move_immediate_returns_value(value in any::<Register>()) {
        prop_assert_eq!(run(&[movi(0, value), Return], 1), Ok(value));
    }

    #[test]
    fn prop_move_copies_register(value in any::<Register>()) {
        let program = [movi(1, value), mov(0, 1), Return];
        prop_assert_eq!(run(&program, 2), Ok(value));
    }

    #[test]
    fn prop_add_immediate_wraps(lhs in any::<Register>(), rhs in any::<Register>()) {
        let program = [movi(0, lhs), addi(0, rhs), Return];
        prop_assert_eq!(run(&program, 1), Ok(lhs.wrapping_add(rhs)));
    }

    #[test]
    fn prop_add_sums_registers(lhs in any::<Register>(), rhs in any::<Register>()) {
        let program = [movi(0, lhs), movi(1, rhs), add(0, 1), Return];
        prop_assert_eq!(run(&program, 2), Ok(lhs.wrapping_add(rhs)));
    }

    #[test]
    fn prop_increment_then_decrement_is_identity(value in any::<Register>()) {
        let program = [movi(0, value), Increment { register: 0 }, Decrement { register: 0 }, Return];
        prop_assert_eq!(run(&program, 1), Ok(value));
    }

    #[test]
    fn prop_parameter_passed_by_move(param in any::<Register>(), offset in any::<Register>()) {
        let program = [
            movi(1, param), // the callee window starts right above the root's
            call(3, 1, 0),
            Return,
            addi(0, offset),
            Return,
        ];
        prop_assert_eq!(run(&program, 1), Ok(param.wrapping_add(offset)));
    }
}

#[rstest]
#[case(Increment { register: 0 }, 6)]
#[case(Decrement { register: 0 }, 4)]
fn test_step_by_one(#[case] instruction: Instruction, #[case] expected: Register) {
    let program = [movi(0, 5), instruction, Return];
    assert_eq!(run(&program, 1), Ok(expected));
}

#[rstest]
#[case(Increment { register: 0 }, Register::MAX, 0)]
#[case(Decrement { register: 0 }, 0, Register::MAX)]
fn test_step_wraps(
    #[case] instruction: Instruction,
    #[case] start: Register,
    #[case] expected: Register,
) {
    let program = [movi(0, start), instruction, Return];
    assert_eq!(run(&program, 1), Ok(expected));
}

#[test]
fn test_arithmetic_is_frame_relative() -> Result<(), MachineError> {
    let program = [
        movi(2, 40), // callee r1, written absolutely before the call
        call(3, 2, 0),
        Return,
        movi(1, 2), // callee r0
        add(0, 1),
        Return,
    ];
    assert_eq!(run(&program, 1)?, 42);
    Ok(())
}

#[test]
fn test_call_delivers_result_and_resumes() -> Result<(), MachineError> {
    let program = [
        call(3, 1, 0),
        addi(0, 1), // runs only after the callee returns
        Return,
        movi(1, 41), // callee's return slot is absolute register 1
        Return,
    ];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    assert_eq!(machine.execute(0, 1)?, 42);
    assert_eq!(machine.pc(), 2);
    assert_eq!(machine.live_frames(), 0);
    assert_eq!(machine.registers_in_use(), 0);
    Ok(())
}

#[test]
fn test_callee_move_immediate_zero_is_absolute() -> Result<(), MachineError> {
    let program = [call(2, 1, 0), Return, movi(0, 77), Return];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    // movi writes the root's r0, then the callee's untouched r0 is returned over it
    assert_eq!(machine.execute(0, 1)?, 0);
    assert_eq!(machine.register(1), 0);
    Ok(())
}

#[test]
fn test_callee_writes_caller_window() -> Result<(), MachineError> {
    let program = [
        call(3, 1, 1),
        add(0, 1),
        Return,
        movi(0, 7), // absolute: the root's r0
        movi(2, 5), // absolute: the callee's r0
        Return,
    ];
    assert_eq!(run(&program, 2)?, 12);
    Ok(())
}

#[test]
fn test_destination_is_caller_relative() -> Result<(), MachineError> {
    #[rustfmt::skip]
    let program = [
        // root, registers 0..1
        call(2, 3, 0),
        Return,
        // outer, registers 1..4
        call(5, 1, 2),
        mov(1, 3),    // outer r0 = outer r2
        Return,
        // inner, registers 4..5
        movi(4, 9),
        Return,
    ];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    assert_eq!(machine.execute(0, 1)?, 9);
    // the inner result landed in outer's r2 (absolute 3), not absolute 2
    assert_eq!(machine.register(3), 9);
    assert_eq!(machine.register(2), 0);
    Ok(())
}

#[test]
fn test_nested_calls_restore_callers() -> Result<(), MachineError> {
    #[rustfmt::skip]
    let program = [
        // root, registers 0..2
        movi(2, 10),
        call(5, 2, 1),
        Increment { register: 1 },
        mov(0, 1),
        Return,
        // f, registers 2..4
        movi(4, 100),
        call(9, 2, 1),
        add(0, 1),
        Return,
        // g, registers 4..6
        movi(6, 1000),
        call(13, 1, 1),
        add(0, 1),
        Return,
        // h, registers 6..7
        Increment { register: 0 },
        Return,
    ];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    assert_eq!(machine.execute(0, 2)?, 1112);
    assert_eq!(machine.pc(), 4);
    assert_eq!(machine.stats().max_depth(), 4);
    assert_eq!(machine.stats().peak_registers(), 7);
    assert_eq!(machine.stats().dispatched(Opcode::Call), 3);
    assert_eq!(machine.stats().dispatched(Opcode::Return), 4);
    Ok(())
}

#[test]
fn test_growth_preserves_ancestor_registers() -> Result<(), MachineError> {
    let depth = 10;
    let program = nested_chain(depth);
    let config = MachineConfig::new()
        .with_initial_registers(4)
        .with_growth_increment(4);
    let mut machine = Machine::with_config(&program, config)?;

    assert_eq!(machine.execute(0, 3)?, chain_result(depth));
    assert!(machine.stats().growths() > 0);
    assert_eq!(machine.stats().peak_registers(), 3 * (depth + 1));
    assert!(machine.capacity() >= 3 * (depth + 1));
    assert_eq!(machine.capacity() % 4, 0);
    for level in 0..depth {
        assert_eq!(machine.register(level * 3 + 1), marker(level));
    }
    Ok(())
}

#[test]
fn test_root_window_larger_than_capacity() -> Result<(), MachineError> {
    let program = [movi(9, 5), mov(0, 9), Return];
    let mut machine = Machine::new(&program, 2)?;
    assert_eq!(machine.execute(0, 10)?, 5);
    assert!(machine.capacity() >= 10);
    assert_eq!(machine.stats().growths(), 1);
    Ok(())
}

#[test]
fn test_unreservable_call_frame_unwinds() -> Result<(), MachineError> {
    let program = [call(2, isize::MAX as usize, 0), Return, Return];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;

    let err = machine.execute(0, 1).unwrap_err();
    assert!(matches!(err, MachineError::RegisterFileExhausted { .. }));
    assert_eq!(machine.stats().max_depth(), 1);
    assert_eq!(machine.live_frames(), 0);
    assert_eq!(machine.registers_in_use(), 0);
    assert_eq!(machine.capacity(), DEFAULT_REGISTER_CAPACITY);
    assert!(machine.is_poisoned());
    Ok(())
}

#[test]
fn test_register_exhaustion_unwinds_frames() -> Result<(), MachineError> {
    let program = nested_chain(4);
    let config = MachineConfig::new()
        .with_initial_registers(4)
        .with_growth_increment(4)
        .with_max_registers(8);
    let mut machine = Machine::with_config(&program, config)?;

    let err = machine.execute(0, 3).unwrap_err();
    assert_eq!(err, MachineError::RegisterFileExhausted { requested: 9 });
    assert_eq!(machine.stats().max_depth(), 2);
    assert_eq!(machine.live_frames(), 0);
    assert_eq!(machine.registers_in_use(), 0);
    assert!(machine.is_poisoned());
    assert_eq!(machine.capacity(), 8);
    Ok(())
}

#[test]
fn test_frame_limit_unwinds_frames() -> Result<(), MachineError> {
    let program = nested_chain(6);
    let config = MachineConfig::new().with_max_frames(3);
    let mut machine = Machine::with_config(&program, config)?;

    assert_eq!(
        machine.execute(0, 3),
        Err(MachineError::CallStackExhausted { depth: 3 })
    );
    assert_eq!(machine.live_frames(), 0);
    assert_eq!(machine.registers_in_use(), 0);
    Ok(())
}

#[test]
fn test_frame_limit_is_enough_for_program() -> Result<(), MachineError> {
    let program = nested_chain(2);
    let config = MachineConfig::new().with_max_frames(3);
    let mut machine = Machine::with_config(&program, config)?;
    assert_eq!(machine.execute(0, 3)?, chain_result(2));
    Ok(())
}

#[test]
fn test_initial_capacity_over_limit() {
    let program = [movi(0, 1), Return];
    let config = MachineConfig::new()
        .with_initial_registers(16)
        .with_max_registers(8);
    assert_eq!(
        Machine::with_config(&program, config).err(),
        Some(MachineError::RegisterFileExhausted { requested: 16 })
    );
}

#[test]
#[should_panic(expected = "machine reused after a failed execution")]
fn test_poisoned_machine_panics() {
    let program = nested_chain(2);
    let config = MachineConfig::new()
        .with_initial_registers(3)
        .with_max_registers(3);
    let mut machine = Machine::with_config(&program, config).unwrap();
    assert!(machine.execute(0, 3).is_err());
    let _ = machine.execute(0, 3);
}

#[test]
fn test_machine_runs_several_entries() -> Result<(), MachineError> {
    let program = [
        movi(0, 3),
        Return,
        movi(0, 4),
        Increment { register: 0 },
        Return,
    ];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    assert_eq!(machine.execute(0, 1)?, 3);
    assert_eq!(machine.execute(2, 1)?, 5);
    assert_eq!(machine.stats().total(), 3);
    Ok(())
}

#[test]
fn test_stats_count_each_opcode() -> Result<(), MachineError> {
    let program = [
        movi(0, 1),
        movi(1, 2),
        add(0, 1),
        addi(0, 3),
        Increment { register: 0 },
        Decrement { register: 1 },
        Return,
    ];
    let mut machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY)?;
    assert_eq!(machine.execute(0, 2)?, 7);

    let stats = machine.stats();
    assert_eq!(stats.dispatched(Opcode::MoveImmediate), 2);
    assert_eq!(stats.dispatched(Opcode::Move), 0);
    assert_eq!(stats.dispatched(Opcode::Return), 1);
    assert_eq!(stats.total(), program.len() as u64);
    let counted: u64 = Opcode::ALL.iter().map(|opcode| stats.dispatched(*opcode)).sum();
    assert_eq!(counted, stats.total());
    Ok(())
}

#[test]
#[should_panic(expected = "has an empty frame")]
fn test_empty_call_frame_panics() {
    let program = [call(2, 0, 0), Return, Return];
    let _ = run(&program, 1);
}

#[test]
#[should_panic(expected = "ran past the end")]
fn test_running_off_program_panics() {
    let program = [movi(0, 1)];
    let _ = run(&program, 1);
}

#[test]
#[should_panic(expected = "outside a window")]
fn test_relative_index_outside_window_panics() {
    let program = [Increment { register: 1 }, Return];
    let _ = run(&program, 1);
}

#[test]
#[should_panic(expected = "needs a return register")]
fn test_empty_root_window_panics() {
    let program = [Return];
    let _ = run(&program, 0);
}

#[rstest]
#[case(Return, "ret")]
#[case(call(12, 3, 1), "call @12 frame 3 -> r1")]
#[case(mov(4, 2), "mov %4, %2")]
#[case(movi(0, 9), "movi %0, #9")]
#[case(add(1, 2), "add r1, r2")]
#[case(addi(0, 5), "addi r0, #5")]
#[case(Increment { register: 3 }, "inc r3")]
#[case(Decrement { register: 0 }, "dec r0")]
fn test_instruction_display(#[case] instruction: Instruction, #[case] expected: &str) {
    assert_eq!(instruction.to_string(), expected);
}

#[test]
fn test_machine_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Machine<'static>>();
}

#[test]
fn test_default_config() {
    let config = MachineConfig::default();
    assert_eq!(config.initial_registers, DEFAULT_REGISTER_CAPACITY);
    assert_eq!(config.growth_increment, DEFAULT_GROWTH_INCREMENT);
    assert_eq!(config.max_registers, None);
    assert_eq!(config.max_frames, None);

    let program = vec![Return];
    let machine = Machine::new(&program, DEFAULT_REGISTER_CAPACITY).unwrap();
    assert_eq!(machine.capacity(), 256);
    assert_eq!(machine.pc(), 0);
}
