//! Lexically nested name environment.

use std::collections::HashMap;

use tern_syntax::ast::Entity;

/// Sentinel keys for statement contexts. They share the namespace with
/// ordinary names but cannot collide with them: all three are reserved
/// keywords and never lex as identifiers.
pub(crate) const RETURN_KEY: &str = "return";
pub(crate) const CONTINUE_KEY: &str = "continue";
pub(crate) const BREAK_KEY: &str = "break";

struct Scope {
    names: HashMap<String, Entity>,
    /// A function body scope. Sentinel lookups stop here so loop labels
    /// never leak across a function boundary.
    boundary: bool,
}

/// A stack of scopes mapping names to the declarations they bind.
pub(crate) struct Env {
    scopes: Vec<Scope>,
}

impl Env {
    pub(crate) fn new() -> Self {
        Self {
            scopes: vec![Scope {
                names: HashMap::new(),
                boundary: false,
            }],
        }
    }

    pub(crate) fn push(&mut self) {
        self.scopes.push(Scope {
            names: HashMap::new(),
            boundary: false,
        });
    }

    pub(crate) fn push_boundary(&mut self) {
        self.scopes.push(Scope {
            names: HashMap::new(),
            boundary: true,
        });
    }

    pub(crate) fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Binds `name` in the innermost scope. Returns false when the scope
    /// already holds an entry for it.
    pub(crate) fn set(&mut self, name: &str, entity: Entity) -> bool {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        if scope.names.contains_key(name) {
            return false;
        }
        scope.names.insert(name.to_string(), entity);
        true
    }

    /// Looks `name` up from the innermost scope outward.
    pub(crate) fn get(&self, name: &str) -> Option<Entity> {
        for scope in self.scopes.iter().rev() {
            if let Some(&e) = scope.names.get(name) {
                return Some(e);
            }
        }
        None
    }

    /// Sentinel lookup: like [`get`](Self::get), but stops at the innermost
    /// function boundary (after checking the boundary scope itself, which is
    /// where the `return` sentinel lives).
    pub(crate) fn get_sentinel(&self, key: &str) -> Option<Entity> {
        for scope in self.scopes.iter().rev() {
            if let Some(&e) = scope.names.get(key) {
                return Some(e);
            }
            if scope.boundary {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut env = Env::new();
        assert!(env.set("x", Entity::Var(1)));
        env.push();
        assert!(env.set("x", Entity::Var(2)));
        assert_eq!(env.get("x"), Some(Entity::Var(2)));
        env.pop();
        assert_eq!(env.get("x"), Some(Entity::Var(1)));
    }

    #[test]
    fn duplicates_rejected_only_in_same_scope() {
        let mut env = Env::new();
        assert!(env.set("x", Entity::Var(1)));
        assert!(!env.set("x", Entity::Var(2)));
        env.push();
        assert!(env.set("x", Entity::Var(3)));
    }

    #[test]
    fn sentinels_stop_at_function_boundaries() {
        let mut env = Env::new();
        env.push();
        env.set(BREAK_KEY, Entity::While(7));
        // Inside a nested function body the loop sentinel is invisible,
        // while ordinary names still resolve.
        env.set("x", Entity::Var(1));
        env.push_boundary();
        env.set(RETURN_KEY, Entity::Lit(9));
        assert_eq!(env.get_sentinel(BREAK_KEY), None);
        assert_eq!(env.get_sentinel(RETURN_KEY), Some(Entity::Lit(9)));
        assert_eq!(env.get("x"), Some(Entity::Var(1)));
        env.pop();
        assert_eq!(env.get_sentinel(BREAK_KEY), Some(Entity::While(7)));
    }
}
