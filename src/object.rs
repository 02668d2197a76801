use super::chunk::Chunk;
use super::value::Value;
use std::time::Instant;

/// Handle to an object in the pool. Two handles are equal iff they name the
/// same heap object, which is what value equality needs: strings are
/// interned, so equal contents always share one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(u32);

pub struct Obj {
    pub kind: ObjKind,
    marked: bool,
    next: Option<ObjRef>,
}

pub enum ObjKind {
    Str(Str),
    Function(Function),
    Native(Native),
    Closure(Closure),
    Upvalue(Upvalue),
}

pub struct Str {
    pub chars: String,
    pub hash: u32,
}

pub struct Function {
    pub name: Option<ObjRef>,
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            name,
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
        }
    }
}

/// What a native function sees of the running interpreter.
pub struct NativeContext {
    pub created_at: Instant,
}

pub type NativeFn = fn(&NativeContext, &[Value]) -> Result<Value, String>;

pub struct Native {
    pub function: NativeFn,
}

pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// A captured variable. `Open` points at a live operand-stack slot; closing
/// moves the slot's value into the cell itself.
#[derive(Debug, Clone)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

/// The object pool: every heap object lives in a slot, free slots are
/// recycled, and the live ones are threaded through an intrusive `next` list
/// rooted at `head` so the sweep can walk and unlink them.
pub struct Objects {
    slots: Vec<Option<Obj>>,
    free: Vec<u32>,
    head: Option<ObjRef>,
    live: usize,
}

impl Objects {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            live: 0,
        }
    }

    pub fn alloc(&mut self, kind: ObjKind) -> ObjRef {
        let obj = Obj {
            kind,
            marked: false,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(obj);
                idx
            }
            None => {
                self.slots.push(Some(obj));
                (self.slots.len() - 1) as u32
            }
        };
        self.head = Some(ObjRef(idx));
        self.live += 1;
        ObjRef(idx)
    }

    pub fn live(&self) -> usize {
        self.live
    }

    fn get(&self, r: ObjRef) -> &Obj {
        self.slots[r.0 as usize].as_ref().unwrap()
    }

    fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        self.slots[r.0 as usize].as_mut().unwrap()
    }

    pub fn kind(&self, r: ObjRef) -> &ObjKind {
        &self.get(r).kind
    }

    pub fn string(&self, r: ObjRef) -> &Str {
        match self.kind(r) {
            ObjKind::Str(s) => s,
            _ => unreachable!("handle does not name a string"),
        }
    }

    pub fn function(&self, r: ObjRef) -> &Function {
        match self.kind(r) {
            ObjKind::Function(f) => f,
            _ => unreachable!("handle does not name a function"),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &Closure {
        match self.kind(r) {
            ObjKind::Closure(c) => c,
            _ => unreachable!("handle does not name a closure"),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut Closure {
        match &mut self.get_mut(r).kind {
            ObjKind::Closure(c) => c,
            _ => unreachable!("handle does not name a closure"),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &Upvalue {
        match self.kind(r) {
            ObjKind::Upvalue(u) => u,
            _ => unreachable!("handle does not name an upvalue"),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut Upvalue {
        match &mut self.get_mut(r).kind {
            ObjKind::Upvalue(u) => u,
            _ => unreachable!("handle does not name an upvalue"),
        }
    }

    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.get(r).marked
    }

    pub fn set_marked(&mut self, r: ObjRef, marked: bool) {
        self.get_mut(r).marked = marked;
    }

    /// Frees every unmarked object and clears the mark bit on the survivors
    /// for the next cycle. Returns how many objects were freed.
    pub fn sweep(&mut self) -> usize {
        let mut previous: Option<ObjRef> = None;
        let mut object = self.head;
        let mut freed = 0;

        while let Some(r) = object {
            let next = self.get(r).next;
            if self.get(r).marked {
                self.get_mut(r).marked = false;
                previous = Some(r);
            } else {
                match previous {
                    Some(p) => self.get_mut(p).next = next,
                    None => self.head = next,
                }
                self.slots[r.0 as usize] = None;
                self.free.push(r.0);
                self.live -= 1;
                freed += 1;
            }
            object = next;
        }

        freed
    }
}
