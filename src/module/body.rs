use serde::Serialize;

use super::{InstrId, Instruction, Module, Op, Operand, StackEffect, TypeRefIdx};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BodyError {
    #[error("no such instruction: {0}")]
    NoSuchInstruction(InstrId),
    #[error("instruction {0} is already part of the body")]
    DuplicateInstruction(InstrId),
    #[error("replacement sequence is empty")]
    EmptyReplacement,
    #[error("cannot remove {0}: it is the last instruction and a branch target")]
    TargetRemoved(InstrId),
    #[error("stack underflow at instruction {0}")]
    StackUnderflow(usize),
    #[error("inconsistent stack depth at instruction {0}")]
    StackMismatch(usize),
    #[error("unknown stack effect at instruction {0}")]
    UnknownStackEffect(usize),
    #[error("stack depth exceeds {} at instruction {0}", u16::MAX)]
    StackOverflow(usize),
}

/// Executable code of a method.
///
/// Branch operands hold instruction identities instead of positions, so inserting and
/// removing instructions never invalidates a jump to an instruction that survives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Body {
    pub max_stack: u16,
    pub locals: Vec<TypeRefIdx>,
    instructions: Vec<Instruction>,
    #[serde(skip)]
    next_id: u32,
}

impl Body {
    pub fn new(max_stack: u16) -> Self {
        Self {
            max_stack,
            locals: vec![],
            instructions: vec![],
            next_id: 0,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Creates a detached instruction owned by this body's identity space.
    pub fn create(&mut self, op: Op, operand: Operand) -> Instruction {
        let id = InstrId(self.next_id);
        self.next_id += 1;

        Instruction { id, op, operand }
    }

    pub fn push(&mut self, op: Op, operand: Operand) -> InstrId {
        let instr = self.create(op, operand);
        let id = instr.id;
        self.instructions.push(instr);
        id
    }

    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.iter().find(|instr| instr.id == id)
    }

    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.instructions.iter().position(|instr| instr.id == id)
    }

    pub fn insert_before(&mut self, target: InstrId, instr: Instruction) -> Result<(), BodyError> {
        if self.position(instr.id).is_some() {
            return Err(BodyError::DuplicateInstruction(instr.id));
        }

        let pos = self
            .position(target)
            .ok_or(BodyError::NoSuchInstruction(target))?;

        self.instructions.insert(pos, instr);
        Ok(())
    }

    /// Removes an instruction, jumps to it are moved to its successor.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction, BodyError> {
        let pos = self.position(id).ok_or(BodyError::NoSuchInstruction(id))?;

        match self.instructions.get(pos + 1).map(Instruction::id) {
            Some(next) => self.retarget(id, next),
            None if self.is_target(id) => return Err(BodyError::TargetRemoved(id)),
            None => {}
        }

        Ok(self.instructions.remove(pos))
    }

    /// Swaps one instruction for a sequence, jumps to it are moved to the first
    /// instruction of the sequence.
    pub fn replace(
        &mut self,
        id: InstrId,
        with: Vec<Instruction>,
    ) -> Result<Instruction, BodyError> {
        let first = with.first().map(Instruction::id).ok_or(BodyError::EmptyReplacement)?;
        let pos = self.position(id).ok_or(BodyError::NoSuchInstruction(id))?;

        for instr in with.iter() {
            if self.position(instr.id).is_some() {
                return Err(BodyError::DuplicateInstruction(instr.id));
            }
        }

        self.retarget(id, first);

        let removed = self.instructions.splice(pos..=pos, with).collect::<Vec<_>>();
        removed
            .into_iter()
            .next()
            .ok_or(BodyError::NoSuchInstruction(id))
    }

    fn is_target(&self, id: InstrId) -> bool {
        self.instructions
            .iter()
            .any(|instr| instr.operand == Operand::Target(id))
    }

    fn retarget(&mut self, from: InstrId, to: InstrId) {
        for instr in self.instructions.iter_mut() {
            if instr.operand == Operand::Target(from) {
                instr.operand = Operand::Target(to);
            }
        }
    }

    /// Maximum evaluation stack depth over every reachable path.
    pub fn compute_max_stack(&self, module: &Module, returns: bool) -> Result<u16, BodyError> {
        let mut depths: Vec<Option<u16>> = vec![None; self.instructions.len()];
        let mut pending = vec![(0usize, 0u16)];
        let mut max = 0u16;

        while let Some((mut pc, mut depth)) = pending.pop() {
            while let Some(instr) = self.instructions.get(pc) {
                match depths[pc] {
                    Some(seen) if seen == depth => break,
                    Some(_) => return Err(BodyError::StackMismatch(pc)),
                    None => depths[pc] = Some(depth),
                }

                let effect = match instr.op {
                    Op::Ret => StackEffect::new(returns as u16, 0),
                    _ => instr
                        .stack_effect(module)
                        .ok_or(BodyError::UnknownStackEffect(pc))?,
                };

                depth = depth
                    .checked_sub(effect.pops)
                    .ok_or(BodyError::StackUnderflow(pc))?
                    .checked_add(effect.pushes)
                    .ok_or(BodyError::StackOverflow(pc))?;
                max = max.max(depth);

                if let Operand::Target(target) = instr.operand {
                    let target = self
                        .position(target)
                        .ok_or(BodyError::NoSuchInstruction(target))?;
                    pending.push((target, depth));
                }

                if instr.op.ends_flow() {
                    break;
                }

                pc += 1;
            }
        }

        Ok(max)
    }
}
