// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Textual IR dump.

use std::fmt;

use super::{Function, InstKind, Module, NumericForm, Operand, Terminator};

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "%{}", v.0),
            Operand::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

fn list(ops: &[Operand]) -> String {
    ops.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn opt(op: &Option<Operand>) -> String {
    op.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

fn form(form: NumericForm) -> &'static str {
    match form {
        NumericForm::Generic => "",
        NumericForm::Number => ".n",
        NumericForm::Int32 => ".i32",
    }
}

impl fmt::Display for InstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstKind::*;
        let m = self.mnemonic();
        match self {
            LoadConst(lit) => write!(f, "{m} {lit}"),
            LoadParam(i) => write!(f, "{m} {i}"),
            LoadLocal(var) => write!(f, "{m} v{}", var.0),
            StoreLocal { var, value } => write!(f, "{m} v{}, {value}", var.0),
            CreateScope { scope, parent } => write!(f, "{m} s{}, {}", scope.0, opt(parent)),
            ResolveScope { start, hops } => write!(f, "{m} {start}, {hops}"),
            GetClosureScope { closure } => write!(f, "{m} {closure}"),
            LoadEnv { env, var } => write!(f, "{m} {env}, v{}", var.0),
            StoreEnv { env, var, value } => write!(f, "{m} {env}, v{}, {value}", var.0),
            ThrowIfEmpty { value, .. } => write!(f, "{m} {value}"),
            LoadGlobal { name, throw_if_missing } => {
                write!(f, "{m} {name}{}", if *throw_if_missing { "" } else { " (typeof)" })
            }
            StoreGlobal { name, value } => write!(f, "{m} {name}, {value}"),
            DeclareGlobalVar { name } => write!(f, "{m} {name}"),
            Binary { op, lhs, rhs, form: nf } => write!(f, "{m}{} {op:?} {lhs}, {rhs}", form(*nf)),
            Unary { op, operand, form: nf } => write!(f, "{m}{} {op:?} {operand}", form(*nf)),
            CreateClosure { function, env } => write!(f, "{m} fn{}, {}", function.0, opt(env)),
            CreateGenerator { inner, env } => write!(f, "{m} fn{}, {}", inner.0, opt(env)),
            Call { callee, this, args } => write!(f, "{m} {callee}, {this}, [{}]", list(args)),
            Construct { callee, new_target, args } => write!(f, "{m} {callee}, {new_target}, [{}]", list(args)),
            CallWithArgsArray { callee, this, args } => write!(f, "{m} {callee}, {this}, {args}"),
            ConstructWithArgsArray { callee, new_target, args } => write!(f, "{m} {callee}, {new_target}, {args}"),
            CallBuiltin { builtin, args } => write!(f, "{m} {}, [{}]", builtin.name(), list(args)),
            LoadNamed { object, name } | DeleteNamed { object, name } => write!(f, "{m} {object}, .{name}"),
            LoadComputed { object, key } | DeleteComputed { object, key } => write!(f, "{m} {object}, [{key}]"),
            StoreNamed { object, name, value } => write!(f, "{m} {object}, .{name}, {value}"),
            StoreComputed { object, key, value } => write!(f, "{m} {object}, [{key}], {value}"),
            DefineOwn { object, key, value, enumerable } => {
                write!(f, "{m} {object}, [{key}], {value}{}", if *enumerable { "" } else { " (hidden)" })
            }
            DefineAccessor { object, key, getter, setter, .. } => {
                write!(f, "{m} {object}, [{key}], {}, {}", opt(getter), opt(setter))
            }
            AllocObject { proto } => write!(f, "{m} {}", opt(proto)),
            AllocObjectLiteral { props } => {
                let body: Vec<String> = props.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{m} {{{}}}", body.join(", "))
            }
            AllocArray { elements } => write!(f, "{m} [{}]", list(elements)),
            SpreadIntoArray { array, iterable } => write!(f, "{m} {array}, {iterable}"),
            CreateRegExp { pattern, flags } => write!(f, "{m} /{pattern}/{flags}"),
            GetIterator { iterable } => write!(f, "{m} {iterable}"),
            IteratorClose { iterator, on_throw } => {
                write!(f, "{m} {iterator}{}", if *on_throw { " (throw)" } else { "" })
            }
            Phi { incoming } => {
                let body: Vec<String> = incoming.iter().map(|(b, v)| format!("bb{}: {v}", b.0)).collect();
                write!(f, "{m} {}", body.join(", "))
            }
            CreateArguments | GetNewTarget | GetGlobalObject | GetParentScope | Catch | Debugger => write!(f, "{m}"),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Branch(b) => write!(f, "Branch bb{}", b.0),
            Terminator::CondBranch { cond, then_block, else_block } => {
                write!(f, "CondBranch {cond}, bb{}, bb{}", then_block.0, else_block.0)
            }
            Terminator::Switch { value, cases, default } => {
                write!(f, "Switch {value}")?;
                for (lit, b) in cases {
                    write!(f, ", {lit} => bb{}", b.0)?;
                }
                write!(f, ", default => bb{}", default.0)
            }
            Terminator::Return(v) => write!(f, "Return {v}"),
            Terminator::Throw(v) => write!(f, "Throw {v}"),
            Terminator::Unreachable => write!(f, "Unreachable"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "<anonymous>" } else { &self.name };
        write!(f, "function {name}(params: {})", self.param_count)?;
        if self.flags.resumable {
            write!(f, " resumable")?;
        }
        if let Some(scope) = self.env_scope {
            write!(f, " env s{}", scope.0)?;
        }
        writeln!(f, ":")?;
        for b in self.live_blocks() {
            let block = &self.blocks[b];
            write!(f, "bb{}:", b.0)?;
            if !block.preds.is_empty() {
                let preds: Vec<String> = block.preds.iter().map(|p| format!("bb{}", p.0)).collect();
                write!(f, " preds {}", preds.join(" "))?;
            }
            if let Some(h) = block.handler {
                write!(f, " handler bb{}", h.0)?;
            }
            writeln!(f)?;
            for &v in &block.insts {
                let inst = &self.insts[v];
                writeln!(f, "  %{} = {} : {}", v.0, inst.kind, inst.ty)?;
            }
            writeln!(f, "  {}", block.term)?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, scope) in &self.scopes {
            let slots: Vec<String> = scope
                .slots
                .iter()
                .map(|&v| format!("v{}:{}", v.0, self.vars[v].name))
                .collect();
            let parent = scope.parent.map_or_else(|| "-".to_string(), |p| format!("s{}", p.0));
            writeln!(f, "scope s{} ({:?}, parent {parent}): [{}]", id.0, scope.kind, slots.join(", "))?;
        }
        for (id, func) in self.functions.iter_enumerated() {
            writeln!(f)?;
            write!(f, "fn{} ", id.0)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Function, InstKind, Literal, Operand, Terminator};
    use crate::sema::FunctionKind;

    #[test]
    fn test_function_dump() {
        let mut f = Function::new("add1", FunctionKind::Normal);
        f.param_count = 1;
        let entry = f.entry;
        let x = f.append(entry, InstKind::LoadParam(1), Default::default());
        let sum = f.append(
            entry,
            InstKind::Binary {
                op: crate::ir::BinaryOp::Add,
                lhs: Operand::Value(x),
                rhs: Operand::Literal(Literal::Number(1.0)),
                form: Default::default(),
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(sum));
        let text = f.to_string();
        assert!(text.starts_with("function add1(params: 1):"));
        assert!(text.contains("%1 = Binary Add %0, 1 : any"));
        assert!(text.contains("Return %1"));
    }
}
