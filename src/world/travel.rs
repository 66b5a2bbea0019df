//! Traversal types of reachabilities and the travel flag masks that select them.

use super::types::{flag_set, AreaContents};

pub const TRAVELTYPE_MASK: u32 = 0x00FF_FFFF;
pub const TRAVELFLAG_NOTTEAM1: u32 = 1 << 24;
pub const TRAVELFLAG_NOTTEAM2: u32 = 2 << 24;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TravelType {
    Invalid = 1,
    Walk = 2,
    Crouch = 3,
    BarrierJump = 4,
    Jump = 5,
    Ladder = 6,
    WalkOffLedge = 7,
    Swim = 8,
    WaterJump = 9,
    Teleport = 10,
    Elevator = 11,
    RocketJump = 12,
    BfgJump = 13,
    GrappleHook = 14,
    DoubleJump = 15,
    RampJump = 16,
    StrafeJump = 17,
    JumpPad = 18,
    FuncBob = 19,
}

impl TravelType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        use TravelType::*;
        Some(match raw {
            1 => Invalid,
            2 => Walk,
            3 => Crouch,
            4 => BarrierJump,
            5 => Jump,
            6 => Ladder,
            7 => WalkOffLedge,
            8 => Swim,
            9 => WaterJump,
            10 => Teleport,
            11 => Elevator,
            12 => RocketJump,
            13 => BfgJump,
            14 => GrappleHook,
            15 => DoubleJump,
            16 => RampJump,
            17 => StrafeJump,
            18 => JumpPad,
            19 => FuncBob,
            _ => return None,
        })
    }

    /// The travel flag a query must carry to use an edge of this type.
    pub fn flag(self) -> TravelFlags {
        use TravelType::*;
        match self {
            Invalid => TravelFlags::INVALID,
            Walk => TravelFlags::WALK,
            Crouch => TravelFlags::CROUCH,
            BarrierJump => TravelFlags::BARRIER_JUMP,
            Jump => TravelFlags::JUMP,
            Ladder => TravelFlags::LADDER,
            WalkOffLedge => TravelFlags::WALK_OFF_LEDGE,
            Swim => TravelFlags::SWIM,
            WaterJump => TravelFlags::WATER_JUMP,
            Teleport => TravelFlags::TELEPORT,
            Elevator => TravelFlags::ELEVATOR,
            RocketJump => TravelFlags::ROCKET_JUMP,
            BfgJump => TravelFlags::BFG_JUMP,
            GrappleHook => TravelFlags::GRAPPLE_HOOK,
            DoubleJump => TravelFlags::DOUBLE_JUMP,
            RampJump => TravelFlags::RAMP_JUMP,
            StrafeJump => TravelFlags::STRAFE_JUMP,
            JumpPad => TravelFlags::JUMP_PAD,
            FuncBob => TravelFlags::FUNC_BOB,
        }
    }
}

flag_set! {
    /// Bitmask restricting which reachabilities and area contents a query may use.
    TravelFlags {
        INVALID = 0x0000_0001,
        WALK = 0x0000_0002,
        CROUCH = 0x0000_0004,
        BARRIER_JUMP = 0x0000_0008,
        JUMP = 0x0000_0010,
        LADDER = 0x0000_0020,
        WALK_OFF_LEDGE = 0x0000_0080,
        SWIM = 0x0000_0100,
        WATER_JUMP = 0x0000_0200,
        TELEPORT = 0x0000_0400,
        ELEVATOR = 0x0000_0800,
        ROCKET_JUMP = 0x0000_1000,
        BFG_JUMP = 0x0000_2000,
        GRAPPLE_HOOK = 0x0000_4000,
        DOUBLE_JUMP = 0x0000_8000,
        RAMP_JUMP = 0x0001_0000,
        STRAFE_JUMP = 0x0002_0000,
        JUMP_PAD = 0x0004_0000,
        AIR = 0x0008_0000,
        WATER = 0x0010_0000,
        SLIME = 0x0020_0000,
        LAVA = 0x0040_0000,
        DO_NOT_ENTER = 0x0080_0000,
        FUNC_BOB = 0x0100_0000,
        FLIGHT = 0x0200_0000,
        BRIDGE = 0x0400_0000,
        NOT_TEAM1 = 0x0800_0000,
        NOT_TEAM2 = 0x1000_0000,
    }
}

impl TravelFlags {
    pub const DEFAULT: TravelFlags = TravelFlags(
        Self::WALK.0
            | Self::CROUCH.0
            | Self::BARRIER_JUMP.0
            | Self::JUMP.0
            | Self::LADDER.0
            | Self::WALK_OFF_LEDGE.0
            | Self::SWIM.0
            | Self::WATER_JUMP.0
            | Self::TELEPORT.0
            | Self::ELEVATOR.0
            | Self::AIR.0
            | Self::WATER.0
            | Self::JUMP_PAD.0
            | Self::FUNC_BOB.0,
    );

    /// Default profile stored in the static route table.
    pub const ALLOWED: TravelFlags = Self::DEFAULT;

    /// Permissive profile stored in the static route table: the default one
    /// plus movement tricks.
    pub const PREFERRED: TravelFlags = TravelFlags(
        Self::DEFAULT.0
            | Self::ROCKET_JUMP.0
            | Self::DOUBLE_JUMP.0
            | Self::RAMP_JUMP.0
            | Self::STRAFE_JUMP.0,
    );

    /// Only plain walking and stepping off ledges.
    pub const WALK_OR_FALL: TravelFlags = TravelFlags(Self::WALK.0 | Self::WALK_OFF_LEDGE.0 | Self::AIR.0);

    /// Bits that select reachability types, as opposed to area contents.
    pub const TRAVERSAL_MASK: u32 = 0x0007_FFFE | Self::FUNC_BOB.0;

    /// Whether the mask permits any kind of movement at all.
    pub fn is_usable(self) -> bool {
        self.0 & Self::TRAVERSAL_MASK != 0
    }

    /// Flags needed to cross a reachability with this raw travel type.
    pub fn for_reachability(raw_travel_type: u32) -> TravelFlags {
        let mut flags = TravelType::from_raw(raw_travel_type & TRAVELTYPE_MASK)
            .map(TravelType::flag)
            .unwrap_or(TravelFlags::INVALID);
        if raw_travel_type & TRAVELFLAG_NOTTEAM1 != 0 {
            flags.insert(TravelFlags::NOT_TEAM1);
        }
        if raw_travel_type & TRAVELFLAG_NOTTEAM2 != 0 {
            flags.insert(TravelFlags::NOT_TEAM2);
        }
        flags
    }

    /// Flags needed to be inside an area with these contents.
    pub fn for_contents(contents: AreaContents) -> TravelFlags {
        let mut flags = if contents.contains(AreaContents::WATER) {
            TravelFlags::WATER
        } else if contents.contains(AreaContents::SLIME) {
            TravelFlags::SLIME
        } else if contents.contains(AreaContents::LAVA) {
            TravelFlags::LAVA
        } else {
            TravelFlags::AIR
        };
        if contents.contains(AreaContents::DO_NOT_ENTER) {
            flags.insert(TravelFlags::DO_NOT_ENTER);
        }
        if contents.contains(AreaContents::NOT_TEAM1) {
            flags.insert(TravelFlags::NOT_TEAM1);
        }
        if contents.contains(AreaContents::NOT_TEAM2) {
            flags.insert(TravelFlags::NOT_TEAM2);
        }
        flags
    }
}
