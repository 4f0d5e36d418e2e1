// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::*;
use crate::bytecode::debug::decode_locations;
use crate::bytecode::FunctionEntry;
use crate::config::DebugInfoLevel;
use crate::regalloc::allocate;
use crate::sema::FunctionKind;

fn options() -> CompileOptions {
    CompileOptions {
        parallel: false,
        ..CompileOptions::default()
    }
}

fn compile(mut module: Module, options: &CompileOptions) -> BytecodeModule {
    let mut allocations = IndexVec::new();
    for f in module.functions.iter_mut() {
        allocations.push(allocate(f, options).expect("allocates"));
    }
    emit_module(&module, &allocations, options, &[]).expect("emits")
}

fn single(f: Function) -> Module {
    let mut module = Module::new("test.js");
    module.functions.push(f);
    module
}

/// Byte offset of each instruction.
fn starts(entry: &FunctionEntry) -> Vec<u32> {
    let mut at = 0;
    entry
        .instructions
        .iter()
        .map(|inst| {
            let start = at;
            at += inst.size();
            start
        })
        .collect()
}

fn jumps(entry: &FunctionEntry) -> Vec<(usize, i32)> {
    entry
        .instructions
        .iter()
        .enumerate()
        .flat_map(|(i, inst)| {
            inst.operands.iter().filter_map(move |op| match op {
                Operand::Jump(rel) => Some((i, *rel)),
                _ => None,
            })
        })
        .collect()
}

/// `for (i = 0; i < n; i++) {} return i`
fn counting_loop() -> Function {
    let mut f = Function::new("count", FunctionKind::Normal);
    f.param_count = 1;
    let entry = f.entry;
    let header = f.add_block(None);
    let body = f.add_block(None);
    let exit = f.add_block(None);

    let n = f.append(entry, InstKind::LoadParam(1), Span::default());
    f.blocks[entry].term = Terminator::Branch(header);

    let i = f.append(header, InstKind::Phi { incoming: Vec::new() }, Span::default());
    let cmp = f.append(
        header,
        InstKind::Binary {
            op: BinaryOp::Lt,
            lhs: IrOperand::Value(i),
            rhs: IrOperand::Value(n),
            form: NumericForm::Generic,
        },
        Span::default(),
    );
    f.blocks[header].term = Terminator::CondBranch {
        cond: IrOperand::Value(cmp),
        then_block: body,
        else_block: exit,
    };

    let next = f.append(
        body,
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: IrOperand::Value(i),
            rhs: IrOperand::number(1.0),
            form: NumericForm::Generic,
        },
        Span::default(),
    );
    f.blocks[body].term = Terminator::Branch(header);
    f.insts[i].kind = InstKind::Phi {
        incoming: vec![(entry, IrOperand::number(0.0)), (body, IrOperand::Value(next))],
    };

    f.blocks[exit].term = Terminator::Return(IrOperand::Value(i));
    f.recompute_preds();
    f
}

#[test]
fn test_loop_jumps_land_on_instruction_starts() {
    let out = compile(single(counting_loop()), &options());
    let entry = &out.functions[0];
    let starts = starts(entry);
    let jumps = jumps(entry);

    assert!(!jumps.is_empty());
    assert!(jumps.iter().any(|&(_, rel)| rel < 0), "loop has a back edge");
    for &(i, rel) in &jumps {
        let target = i64::from(starts[i]) + i64::from(rel);
        assert!(starts.iter().any(|&s| i64::from(s) == target), "jump from {i} lands mid-instruction");
        assert!(!entry.instructions[i].wide, "short loop needs no wide jumps");
    }
    assert_eq!(entry.length as usize, out.code.len());
    let rets = entry.instructions.iter().filter(|inst| inst.opcode == OpCode::Ret).count();
    assert_eq!(rets, 1);
    // Reverse postorder places the exit before the body, so the code ends
    // with the back edge.
    let last = entry.instructions.len() - 1;
    assert_eq!(entry.instructions[last].opcode, OpCode::Jmp);
    assert!(jumps.iter().any(|&(i, rel)| i == last && rel < 0));
}

#[test]
fn test_far_forward_jump_stays_wide() {
    let mut f = Function::new("far", FunctionKind::Normal);
    let entry = f.entry;
    let big = f.add_block(None);
    let exit = f.add_block(None);
    let c = f.append(entry, InstKind::LoadParam(1), Span::default());
    f.blocks[entry].term = Terminator::CondBranch {
        cond: IrOperand::Value(c),
        then_block: big,
        else_block: exit,
    };
    for i in 0..40 {
        f.append(big, InstKind::LoadConst(Literal::Number(f64::from(i) + 0.5)), Span::default());
    }
    f.blocks[big].term = Terminator::Branch(exit);
    f.blocks[exit].term = Terminator::Return(IrOperand::Value(c));
    f.recompute_preds();

    let out = compile(single(f), &options());
    let func = &out.functions[0];
    let starts = starts(func);
    let ret = func.instructions.iter().position(|inst| inst.opcode == OpCode::Ret).expect("has a return");
    let far: Vec<usize> = jumps(func)
        .into_iter()
        .filter(|&(i, rel)| i64::from(starts[i]) + i64::from(rel) == i64::from(starts[ret]))
        .map(|(i, _)| i)
        .collect();
    assert!(!far.is_empty(), "some jump reaches the exit");
    for i in far {
        if starts[ret] - starts[i] > 127 {
            assert!(func.instructions[i].wide);
        }
    }
    assert!(func.instructions.iter().any(|inst| inst.wide && inst.opcode.is_jump()));
}

#[test]
fn test_entry_first_and_shared_strings() {
    let mut helper = Function::new("helper", FunctionKind::Normal);
    let g = helper.append(
        helper.entry,
        InstKind::LoadGlobal {
            name: "print".into(),
            throw_if_missing: true,
        },
        Span::default(),
    );
    helper.blocks[helper.entry].term = Terminator::Return(IrOperand::Value(g));

    let mut main = Function::new("main", FunctionKind::Program);
    let e = main.entry;
    let g = main.append(
        e,
        InstKind::LoadGlobal {
            name: "print".into(),
            throw_if_missing: true,
        },
        Span::default(),
    );
    let closure = main.append(
        e,
        InstKind::CreateClosure {
            function: FunctionId(0),
            env: None,
        },
        Span::default(),
    );
    let call = main.append(
        e,
        InstKind::Call {
            callee: IrOperand::Value(g),
            this: IrOperand::Literal(Literal::Undefined),
            args: vec![IrOperand::Value(closure)],
        },
        Span::default(),
    );
    main.blocks[e].term = Terminator::Return(IrOperand::Value(call));

    let mut module = Module::new("test.js");
    module.functions.push(helper);
    module.entry = module.functions.push(main);

    let out = compile(module, &options());
    assert_eq!(out.string(out.functions[0].name), Some("main"));
    assert_eq!(out.string(out.functions[1].name), Some("helper"));
    assert_eq!(out.strings.iter().filter(|s| *s == "print").count(), 1);
    assert_eq!(out.functions[1].offset, out.functions[0].length);

    let create = out.functions[0]
        .instructions
        .iter()
        .find(|inst| inst.opcode == OpCode::CreateClosureNoEnv)
        .expect("creates the closure");
    assert_eq!(create.operands[1], Operand::Function(1));
    assert!(out.functions[0].instructions.iter().any(|inst| inst.opcode == OpCode::Call2));
    assert!(out.debug.is_none());
}

#[test]
fn test_protected_range_and_handler() {
    let mut f = Function::new("guarded", FunctionKind::Normal);
    let entry = f.entry;
    let catch = f.add_block(None);
    let body = f.add_block(Some(catch));
    let after = f.add_block(None);
    f.blocks[entry].term = Terminator::Branch(body);

    f.append(
        body,
        InstKind::LoadGlobal {
            name: "missing".into(),
            throw_if_missing: true,
        },
        Span::default(),
    );
    f.blocks[body].term = Terminator::Branch(after);
    f.append(catch, InstKind::Catch, Span::default());
    f.blocks[catch].term = Terminator::Branch(after);
    f.blocks[after].term = Terminator::Return(IrOperand::Literal(Literal::Undefined));
    f.recompute_preds();

    let out = compile(single(f), &options());
    let func = &out.functions[0];
    assert_eq!(func.exceptions.len(), 1);
    let range = func.exceptions[0];
    assert!(range.start < range.end);

    let starts = starts(func);
    let handler = starts.iter().position(|&s| s == range.handler).expect("handler is an instruction start");
    assert_eq!(func.instructions[handler].opcode, OpCode::Catch);
    let get = func.instructions.iter().position(|inst| inst.opcode == OpCode::GetGlobal).expect("loads the global");
    assert!(range.start <= starts[get] && starts[get] < range.end);
}

#[test]
fn test_debug_locations_follow_level() {
    let at = |line| Span {
        start: crate::ast::SourceLoc { line, column: 1 },
        end: crate::ast::SourceLoc { line, column: 10 },
    };
    let build = || {
        let mut f = Function::new("main", FunctionKind::Program);
        f.span = at(1);
        let e = f.entry;
        let a = f.append(e, InstKind::LoadConst(Literal::Number(2.5)), at(2));
        let b = f.append(
            e,
            InstKind::LoadNamed {
                object: IrOperand::Value(a),
                name: "x".into(),
            },
            at(3),
        );
        f.blocks[e].term = Terminator::Return(IrOperand::Value(b));
        f.blocks[e].term_span = at(4);
        single(f)
    };

    let full = compile(
        build(),
        &CompileOptions {
            debug_info: DebugInfoLevel::Full,
            ..options()
        },
    );
    let throwing = compile(
        build(),
        &CompileOptions {
            debug_info: DebugInfoLevel::Throwing,
            ..options()
        },
    );

    let decode = |m: &BytecodeModule| {
        let debug = m.debug.as_ref().expect("has debug info");
        let f = &debug.functions[0];
        decode_locations(&f.locations, (f.line, f.column), debug.has_scopes).expect("decodes")
    };
    let full_lines: Vec<u32> = decode(&full).iter().map(|l| l.line).collect();
    let throwing_lines: Vec<u32> = decode(&throwing).iter().map(|l| l.line).collect();
    assert_eq!(full_lines, vec![2, 3, 4]);
    assert_eq!(throwing_lines, vec![3]);
}

#[test]
fn test_numeric_forms_select_specialized_opcodes() {
    assert_eq!(binary_opcode(BinaryOp::Add, NumericForm::Number), OpCode::AddN);
    assert_eq!(binary_opcode(BinaryOp::Add, NumericForm::Generic), OpCode::Add);
    assert_eq!(binary_opcode(BinaryOp::BitOr, NumericForm::Int32), OpCode::BitOrI);
    assert_eq!(binary_opcode(BinaryOp::StrictEq, NumericForm::Number), OpCode::StrictEq);
    assert_eq!(unary_opcode(UnaryOp::Inc, NumericForm::Int32), OpCode::IncN);
    assert_eq!(builtin_index(Builtin::SpawnAsync), 0);
    assert_eq!(builtin_index(Builtin::ThrowReferenceError), 9);
}
