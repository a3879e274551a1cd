use luacore::lua_value::Proto;
use luacore::{Gc, Instruction, OpCode, OpMode, undump};
use std::env;
use std::fs;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let Some(filename) = args.get(1) else {
        println!("Usage: chunk_inspect <chunk.luac>");
        std::process::exit(0);
    };
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", filename, e);
            std::process::exit(1);
        }
    };

    let mut gc = Gc::default();
    match undump(&mut gc, bytes.as_slice(), &format!("@{}", filename)) {
        Ok(closure) => {
            println!("=== File: {} ===\n", filename);
            dump_proto(&closure.proto, "main", 0);
            log::info!("{} bytes accounted", gc.total_bytes());
            closure.proto.free(&mut gc);
            log::debug!("{} bytes left after release", gc.total_bytes());
        }
        Err(e) => {
            eprintln!("Load error: {}", e);
            std::process::exit(1);
        }
    }
}

fn operands(inst: Instruction, op: OpCode) -> String {
    let a = inst.get_a();
    let rk = |x: u32| {
        if Instruction::is_k(x) {
            format!("K{}", Instruction::rk_index(x))
        } else {
            x.to_string()
        }
    };
    match op.get_mode() {
        OpMode::IABx => format!("{} {}", a, inst.get_bx()),
        OpMode::IAsBx => format!("{} {}", a, inst.get_sbx()),
        OpMode::IAx => inst.get_ax().to_string(),
        OpMode::IABC => match op {
            OpCode::Move | OpCode::Unm | OpCode::Not | OpCode::Len | OpCode::LoadNil => {
                format!("{} {}", a, inst.get_b())
            }
            OpCode::GetUpval | OpCode::SetUpval | OpCode::Return | OpCode::Vararg => {
                format!("{} {}", a, inst.get_b())
            }
            OpCode::TForCall => format!("{} {}", a, inst.get_c()),
            OpCode::GetTabUp | OpCode::GetTable | OpCode::Self_ => {
                format!("{} {} {}", a, inst.get_b(), rk(inst.get_c()))
            }
            OpCode::SetTabUp
            | OpCode::SetTable
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Eq
            | OpCode::Lt
            | OpCode::Le => format!("{} {} {}", a, rk(inst.get_b()), rk(inst.get_c())),
            _ => format!("{} {} {}", a, inst.get_b(), inst.get_c()),
        },
    }
}

fn dump_proto(proto: &Proto, name: &str, depth: usize) {
    let indent = "  ".repeat(depth);

    println!("{}=== {} ===", indent, name);
    println!(
        "{}lines: {}-{}, params: {}, vararg: {}, max_stack: {}",
        indent,
        proto.linedefined,
        proto.lastlinedefined,
        proto.param_count,
        proto.is_vararg,
        proto.max_stack_size
    );
    println!();

    for (pc, &inst) in proto.code.iter().enumerate() {
        let line = proto
            .line_at(pc)
            .map(|l| format!("[{}]", l))
            .unwrap_or_else(|| "[-]".to_string());
        let detail = match inst.get_opcode() {
            Some(op) => format!("{:<9} {}", op.name(), operands(inst, op)),
            None => format!("<opcode {}>", inst.opcode_raw()),
        };
        println!("{}{:4} {:>6} {}", indent, pc + 1, line, detail);
    }

    if !proto.constants.is_empty() {
        println!("\n{}constants ({}):", indent, proto.constants.len());
        for (i, val) in proto.constants.iter().enumerate() {
            println!("{}  {} = {:?}", indent, i, val);
        }
    }

    if !proto.loc_vars.is_empty() {
        println!("\n{}locals ({}):", indent, proto.loc_vars.len());
        for (i, var) in proto.loc_vars.iter().enumerate() {
            let name = var.name.as_ref().map(|s| s.to_string()).unwrap_or_default();
            println!("{}  {} = {} [{}, {})", indent, i, name, var.start_pc, var.end_pc);
        }
    }

    if !proto.upvalue_descs.is_empty() {
        println!("\n{}upvalues ({}):", indent, proto.upvalue_descs.len());
        for (i, uv) in proto.upvalue_descs.iter().enumerate() {
            let uv_type = if uv.is_local { "local" } else { "upvalue" };
            let name = uv.name.as_ref().map(|s| s.to_string()).unwrap_or_default();
            println!("{}  {} = {} {} index={}", indent, i, name, uv_type, uv.index);
        }
    }

    if !proto.child_protos.is_empty() {
        println!();
        for (i, child) in proto.child_protos.iter().enumerate() {
            dump_proto(child, &format!("function <PROTO[{}]>", i), depth + 1);
        }
    }
}
