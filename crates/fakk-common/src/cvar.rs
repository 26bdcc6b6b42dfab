// cvar.rs — console variables that tune the collision code

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::{com_dprintf, com_printf};
use crate::q_shared::CVAR_NOSET;

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: i32,
    pub value: f32,
}

/// The full cvar system context.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            value: value.parse::<f32>().unwrap_or(0.0),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.cvar_index.get(name) {
            Some(&idx) => idx,
            None => return self.get(name, value, 0),
        };
        let var = &mut self.cvar_vars[idx];

        if !force && var.flags & CVAR_NOSET != 0 {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        var.string = value.to_string();
        var.value = value.parse::<f32>().unwrap_or(0.0);
        com_dprintf(&format!("{} = \"{}\"\n", name, value));
        idx
    }

    /// Set a cvar value (respects NOSET).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Pulls `+set name value` triples out of a command line. Values set
    /// this way bypass NOSET, like they do at engine startup. Returns the
    /// remaining arguments in order.
    pub fn apply_command_line<I>(&mut self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut rest = Vec::new();
        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            if arg != "+set" {
                rest.push(arg);
                continue;
            }
            match (it.next(), it.next()) {
                (Some(name), Some(value)) => {
                    self.force_set(&name, &value);
                }
                (Some(name), None) => com_printf(&format!("+set {}: missing value\n", name)),
                _ => com_printf("+set: missing name\n"),
            }
        }
        rest
    }
}

// ============================================================
// Global singleton
// ============================================================

static CVAR_CTX: Mutex<Option<CvarContext>> = parking_lot::const_mutex(None);

pub fn cvar_init() {
    let mut g = CVAR_CTX.lock();
    if g.is_none() {
        *g = Some(CvarContext::new());
    }
}

pub fn cvar_get(name: &str, value: &str, flags: i32) -> Option<usize> {
    CVAR_CTX.lock().as_mut().map(|c| c.get(name, value, flags))
}

pub fn cvar_set(name: &str, value: &str) {
    if let Some(c) = CVAR_CTX.lock().as_mut() {
        c.set(name, value);
    }
}

pub fn cvar_variable_value(name: &str) -> f32 {
    CVAR_CTX.lock().as_ref().map_or(0.0, |c| c.variable_value(name))
}

/// Access the global CVAR_CTX with a closure. Returns None if not initialized.
pub fn with_cvar_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CvarContext) -> R,
{
    CVAR_CTX.lock().as_mut().map(f)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvar_get_and_find() {
        let mut ctx = CvarContext::new();
        ctx.get("cm_noAreas", "1", 0);
        assert_eq!(ctx.variable_value("cm_noAreas"), 1.0);
        assert_eq!(ctx.variable_string("cm_noAreas"), "1");
    }

    #[test]
    fn test_cvar_get_creates_once() {
        let mut ctx = CvarContext::new();
        ctx.get("developer", "0", 0);
        ctx.get("developer", "1", CVAR_NOSET);
        assert_eq!(ctx.variable_string("developer"), "0");
        assert_eq!(ctx.find_var("developer").unwrap().flags, CVAR_NOSET);
    }

    #[test]
    fn test_cvar_noset() {
        let mut ctx = CvarContext::new();
        ctx.get("basedir", ".", CVAR_NOSET);
        ctx.set("basedir", "/tmp");
        assert_eq!(ctx.variable_string("basedir"), ".");
        ctx.force_set("basedir", "/tmp");
        assert_eq!(ctx.variable_string("basedir"), "/tmp");
    }

    #[test]
    fn test_command_line_sets() {
        let mut ctx = CvarContext::new();
        ctx.get("developer", "0", CVAR_NOSET);
        let args = ["fakk-cm", "+set", "developer", "1", "info", "+set", "cm_noAreas", "1", "maps/t.bsp"]
            .iter()
            .map(|s| s.to_string());
        let rest = ctx.apply_command_line(args);
        assert_eq!(rest, vec!["fakk-cm", "info", "maps/t.bsp"]);
        assert_eq!(ctx.variable_value("developer"), 1.0);
        assert_eq!(ctx.variable_value("cm_noAreas"), 1.0);
    }

    #[test]
    fn test_command_line_dangling_set() {
        let mut ctx = CvarContext::new();
        let rest = ctx.apply_command_line(["x".to_string(), "+set".to_string(), "y".to_string()]);
        assert_eq!(rest, vec!["x"]);
        assert!(ctx.find_var("y").is_none());
    }
}
