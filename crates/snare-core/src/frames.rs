//! Stack frames and thread snapshots of a stopped process.
//!
//! Frames are rebuilt from the backend's raw frames on every request and
//! carry the generation of the stop they were taken in.

use std::fmt::Write as _;

use crate::debuginfo::{LineEntry, Module};
use crate::inferior::RawFrame;
use crate::types::{Address, Generation, StopReason, ThreadId};

/// One frame of a stopped thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame
{
    generation: Generation,
    thread: ThreadId,
    index: usize,
    pc: Address,
    frame_base: Address,
    function: Option<String>,
    line: Option<LineEntry>,
}

impl Frame
{
    /// Symbolicate a raw frame.
    ///
    /// Caller frames hold return addresses, which may already belong to the
    /// next line (or the next function), so they are looked up one byte back.
    #[must_use]
    pub fn from_raw(module: &Module, raw: RawFrame, index: usize, thread: ThreadId, generation: Generation) -> Self
    {
        let lookup = if index == 0 { raw.pc } else { raw.pc - 1 };
        let function = module
            .function_at(lookup)
            .map(|function| function.name.clone())
            .or_else(|| module.symbol_for_address(lookup).map(|symbol| symbol.display_name().to_string()));
        Self {
            generation,
            thread,
            index,
            pc: raw.pc,
            frame_base: raw.frame_base,
            function,
            line: module.line_entry_for_address(lookup).cloned(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> Generation
    {
        self.generation
    }

    #[must_use]
    pub fn thread(&self) -> ThreadId
    {
        self.thread
    }

    /// 0 for the innermost frame.
    #[must_use]
    pub fn index(&self) -> usize
    {
        self.index
    }

    #[must_use]
    pub fn pc(&self) -> Address
    {
        self.pc
    }

    #[must_use]
    pub fn frame_base(&self) -> Address
    {
        self.frame_base
    }

    /// Name of the function executing in this frame.
    #[must_use]
    pub fn function_name(&self) -> Option<&str>
    {
        self.function.as_deref()
    }

    #[must_use]
    pub fn line_entry(&self) -> Option<&LineEntry>
    {
        self.line.as_ref()
    }

    /// Address used for symbol and scope lookups.
    #[must_use]
    pub fn lookup_address(&self) -> Address
    {
        if self.index == 0 {
            self.pc
        } else {
            self.pc - 1
        }
    }

    /// `frame #0: 0x... a.out`main + 20 at main.c:14`
    #[must_use]
    pub fn describe(&self, module: &Module) -> String
    {
        format!(
            "frame #{}: {} {}",
            self.index,
            self.pc.to_padded_hex(module.architecture().pointer_size_bytes()),
            module.symbolicate(self.lookup_address())
        )
    }
}

/// The controlled thread as seen at one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot
{
    /// Backend thread id.
    pub id: ThreadId,
    /// 1-based index in the process's thread list.
    pub index: u32,
    /// Why the process stopped.
    pub stop_reason: Option<StopReason>,
    /// Frames, innermost first.
    pub frames: Vec<Frame>,
}

impl ThreadSnapshot
{
    /// `bt`-style listing of the thread.
    ///
    /// ```text
    /// * thread #1: tid = 4242, 0x0000000000401134 a.out`main + 20 at main.c:14, stop reason = breakpoint 1.1
    ///     frame #0: 0x0000000000401134 a.out`main + 20 at main.c:14
    /// ```
    #[must_use]
    pub fn backtrace(&self, module: &Module) -> String
    {
        let width = module.architecture().pointer_size_bytes();
        let mut text = format!("* thread #{}: tid = {}", self.index, self.id.raw());
        if let Some(top) = self.frames.first() {
            let _ = write!(text, ", {} {}", top.pc.to_padded_hex(width), module.symbolicate(top.pc));
        }
        if let Some(reason) = self.stop_reason {
            let _ = write!(text, ", stop reason = {reason}");
        }
        for frame in &self.frames {
            let _ = write!(text, "\n    {}", frame.describe(module));
        }
        text
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::debuginfo::ModuleBuilder;
    use crate::types::Architecture;

    fn module() -> Module
    {
        let mut builder = ModuleBuilder::new("a.out", Architecture::X86_64);
        builder.compile_unit("main.c");
        builder.function("helper", 0x1000, 0x1020, "main.c", 3);
        builder.function("main", 0x1020, 0x1060, "main.c", 9);
        builder.lines("main.c", &[(3, 0x1000, 0x1010), (4, 0x1010, 0x1020), (9, 0x1020, 0x1030), (10, 0x1030, 0x1060)]);
        match builder.build() {
            Ok(module) => module,
            Err(err) => panic!("fixture module: {err}"),
        }
    }

    #[test]
    fn test_caller_frame_uses_call_site_line()
    {
        let module = module();
        let raw = RawFrame {
            pc: Address::new(0x1030),
            frame_base: Address::new(0x7000),
        };
        let top = Frame::from_raw(&module, raw, 0, ThreadId(1), Generation::INITIAL);
        let caller = Frame::from_raw(&module, raw, 1, ThreadId(1), Generation::INITIAL);
        assert_eq!(top.line_entry().map(|entry| entry.line), Some(10));
        assert_eq!(caller.line_entry().map(|entry| entry.line), Some(9));
        assert_eq!(caller.function_name(), Some("main"));
    }

    #[test]
    fn test_backtrace_text()
    {
        let module = module();
        let frames = vec![
            Frame::from_raw(
                &module,
                RawFrame {
                    pc: Address::new(0x1010),
                    frame_base: Address::new(0x6f00),
                },
                0,
                ThreadId(4242),
                Generation::INITIAL,
            ),
            Frame::from_raw(
                &module,
                RawFrame {
                    pc: Address::new(0x1030),
                    frame_base: Address::new(0x7000),
                },
                1,
                ThreadId(4242),
                Generation::INITIAL,
            ),
        ];
        let thread = ThreadSnapshot {
            id: ThreadId(4242),
            index: 1,
            stop_reason: Some(StopReason::PlannedStep),
            frames,
        };
        let text = thread.backtrace(&module);
        assert_eq!(
            text,
            "* thread #1: tid = 4242, 0x0000000000001010 a.out`helper + 16 at main.c:4, stop reason = step over\n    \
             frame #0: 0x0000000000001010 a.out`helper + 16 at main.c:4\n    \
             frame #1: 0x0000000000001030 a.out`main + 15 at main.c:9"
        );
    }
}
