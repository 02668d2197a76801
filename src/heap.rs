use super::object::{ObjKind, ObjRef, Objects, Str, Upvalue};
use super::table::Table;
use super::value::Value;

/// FNV-1a, 32-bit.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

const FIRST_GC: usize = 64;
const GROW_FACTOR: usize = 2;

/// Owns the object pool and the string intern table, and runs the
/// mark-and-sweep cycle. Roots are marked by the caller (the VM knows its
/// stack, frames, open upvalues, and globals); the heap traces and sweeps.
pub struct Heap {
    objects: Objects,
    strings: Table,
    gray: Vec<ObjRef>,
    next_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: Objects::new(),
            strings: Table::new(),
            gray: Vec::new(),
            next_gc: FIRST_GC,
        }
    }

    pub fn objects(&self) -> &Objects {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut Objects {
        &mut self.objects
    }

    pub fn alloc(&mut self, kind: ObjKind) -> ObjRef {
        self.objects.alloc(kind)
    }

    /// Canonicalizes a string: equal contents always share one handle, so
    /// string equality reduces to handle identity.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(existing) = self.strings.find_string(&self.objects, chars, hash) {
            return existing;
        }
        let r = self.objects.alloc(ObjKind::Str(Str {
            chars: chars.to_string(),
            hash,
        }));
        self.strings.set(&self.objects, r, Value::Nil);
        r
    }

    pub fn should_collect(&self) -> bool {
        cfg!(feature = "gc-stress") || self.objects.live() >= self.next_gc
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        if self.objects.is_marked(r) {
            return;
        }
        self.objects.set_marked(r, true);
        self.gray.push(r);
    }

    /// Drains the gray worklist, blackening each object by marking what it
    /// references.
    pub fn trace(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        let mut children = Vec::new();
        let mut values = Vec::new();
        match self.objects.kind(r) {
            ObjKind::Str(_) | ObjKind::Native(_) => {}
            ObjKind::Function(function) => {
                if let Some(name) = function.name {
                    children.push(name);
                }
                values.extend_from_slice(function.chunk.constants());
            }
            ObjKind::Closure(closure) => {
                children.push(closure.function);
                children.extend_from_slice(&closure.upvalues);
            }
            // an open upvalue's slot is rooted through the stack
            ObjKind::Upvalue(Upvalue::Open(_)) => {}
            ObjKind::Upvalue(Upvalue::Closed(value)) => values.push(*value),
        }
        for child in children {
            self.mark_object(child);
        }
        for value in values {
            self.mark_value(value);
        }
    }

    /// Prunes the intern table of strings that did not survive marking, then
    /// frees every unmarked object. Returns how many objects were freed.
    pub fn sweep(&mut self) -> usize {
        self.strings.remove_unmarked(&self.objects);
        let freed = self.objects.sweep();
        self.next_gc = (self.objects.live() * GROW_FACTOR).max(FIRST_GC);
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Closure, Function};

    #[test]
    fn interning_returns_the_same_handle_for_equal_bytes() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.objects().live(), 2);
    }

    #[test]
    fn collect_frees_the_unreachable_and_keeps_the_reachable() {
        let mut heap = Heap::new();
        let kept = heap.intern("kept");
        let _garbage = heap.intern("garbage");

        heap.mark_object(kept);
        heap.trace();
        assert_eq!(heap.sweep(), 1);
        assert_eq!(heap.objects().live(), 1);
        assert!(!heap.objects().is_marked(kept));

        // the swept string is gone from the intern table too: re-interning
        // its bytes builds a fresh object instead of resurrecting a handle
        let again = heap.intern("garbage");
        assert_eq!(heap.objects().string(again).chars, "garbage");
        assert_eq!(heap.objects().live(), 2);
    }

    #[test]
    fn tracing_follows_closures_functions_and_upvalues() {
        let mut heap = Heap::new();
        let name = heap.intern("f");
        let constant = heap.intern("constant");

        let mut function = Function::new(Some(name));
        function.chunk.add_constant(Value::Obj(constant));
        let function = heap.alloc(ObjKind::Function(function));

        let closed = heap.intern("closed over");
        let upvalue = heap.alloc(ObjKind::Upvalue(Upvalue::Closed(Value::Obj(closed))));
        let closure = heap.alloc(ObjKind::Closure(Closure {
            function,
            upvalues: vec![upvalue],
        }));

        let _garbage = heap.intern("garbage");

        heap.mark_object(closure);
        heap.trace();
        // only the unreferenced string goes; the closure keeps its function,
        // the function its name and constants, the upvalue its closed value
        assert_eq!(heap.sweep(), 1);
        assert_eq!(heap.objects().live(), 6);
        assert_eq!(heap.objects().string(name).chars, "f");
        assert_eq!(heap.objects().string(constant).chars, "constant");
        assert_eq!(heap.objects().string(closed).chars, "closed over");

        // and with no roots at all, the next cycle frees the lot
        heap.trace();
        assert_eq!(heap.sweep(), 6);
        assert_eq!(heap.objects().live(), 0);
    }

    #[test]
    #[cfg(not(feature = "gc-stress"))]
    fn collection_threshold_grows_with_the_live_set() {
        let mut heap = Heap::new();
        assert!(!heap.should_collect());
        for i in 0..FIRST_GC {
            heap.intern(&i.to_string());
        }
        assert!(heap.should_collect());

        heap.trace();
        heap.sweep();
        assert!(!heap.should_collect());
    }
}
