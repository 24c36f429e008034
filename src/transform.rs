//! Transform synthesis: reconciling environments at control-flow joins.
//!
//! Given two environments over overlapping name sets, `merge_envs` produces
//! the merged environment (names whose inferred types disagree become `Dyn`),
//! plus the `STransform` sequences each side must execute so both worlds
//! arrive at the merged name-to-address-kind mapping. Names bound on only
//! one side become fresh `Dyn` bindings, reported so callers can allocate
//! sentinel-initialized slots for them.

use std::rc::Rc;

use crate::ast::Type;
use crate::sast::SStmt;
use crate::semant::{Binding, Env};

pub struct MergeOut {
    pub env: Env,
    /// Transforms the first world runs at its exit.
    pub tx_a: Vec<SStmt>,
    /// Transforms the second world runs at its exit.
    pub tx_b: Vec<SStmt>,
    /// Names whose merged binding is a newly-created `Dyn`.
    pub new_dyn: Vec<String>,
}

fn data_eq(a: &Option<Rc<crate::ast::Func>>, b: &Option<Rc<crate::ast::Func>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn merge_envs(a: &Env, b: &Env) -> MergeOut {
    let mut out = MergeOut {
        env: Env::new(),
        tx_a: Vec::new(),
        tx_b: Vec::new(),
        new_dyn: Vec::new(),
    };

    let names: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    for name in names {
        match (a.get(name), b.get(name)) {
            (Some(ba), Some(bb)) => {
                if ba.inferred == bb.inferred && ba.explicit == bb.explicit {
                    let data = if data_eq(&ba.data, &bb.data) {
                        ba.data.clone()
                    } else {
                        None
                    };
                    out.env.insert(
                        name.clone(),
                        Binding {
                            data,
                            ..ba.clone()
                        },
                    );
                    continue;
                }
                // Divergence implies the explicit type was Dyn on this name:
                // a concrete annotation pins the inferred type on both sides.
                if ba.inferred != Type::Dyn {
                    out.tx_a
                        .push(SStmt::STransform(name.clone(), ba.inferred, Type::Dyn));
                }
                if bb.inferred != Type::Dyn {
                    out.tx_b
                        .push(SStmt::STransform(name.clone(), bb.inferred, Type::Dyn));
                }
                let data = if data_eq(&ba.data, &bb.data) {
                    ba.data.clone()
                } else {
                    None
                };
                out.env.insert(
                    name.clone(),
                    Binding {
                        explicit: Type::Dyn,
                        inferred: Type::Dyn,
                        data,
                    },
                );
            }
            (Some(ba), None) => {
                if ba.inferred != Type::Dyn {
                    out.tx_a
                        .push(SStmt::STransform(name.clone(), ba.inferred, Type::Dyn));
                }
                out.env.insert(name.clone(), Binding::dyn_binding());
                out.new_dyn.push(name.clone());
            }
            (None, Some(bb)) => {
                if bb.inferred != Type::Dyn {
                    out.tx_b
                        .push(SStmt::STransform(name.clone(), bb.inferred, Type::Dyn));
                }
                out.env.insert(name.clone(), Binding::dyn_binding());
                out.new_dyn.push(name.clone());
            }
            (None, None) => unreachable!(),
        }
    }
    out
}

/// True when two environments agree on explicit and inferred types and on
/// the identity of any associated function data.
pub fn envs_agree(a: &Env, b: &Env) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(name, ba)| {
        b.get(name).is_some_and(|bb| {
            ba.explicit == bb.explicit && ba.inferred == bb.inferred && data_eq(&ba.data, &bb.data)
        })
    })
}
