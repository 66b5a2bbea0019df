use bevy::prelude::*;

/// Declares a `u32` flag set with the usual set operations.
macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$cmeta:meta])* $flag:ident = $value:expr,)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            $($(#[$cmeta])* pub const $flag: $name = $name($value);)*

            #[inline]
            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            #[inline]
            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            #[inline]
            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            #[inline]
            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

pub(crate) use flag_set;

flag_set! {
    /// Area flags. The low bits come from the world file, the high bits are
    /// derived at load time.
    AreaFlags {
        GROUNDED = 1,
        LADDER = 2,
        LIQUID = 4,
        BRIDGE = 16,
        LEDGE = 1 << 10,
        WALL = 1 << 11,
        JUNK = 1 << 12,
        INCLINED_FLOOR = 1 << 13,
        NOFALL = 1 << 14,
        SKIP_COLLISION_16 = 1 << 15,
        SKIP_COLLISION_32 = 1 << 16,
        SKIP_COLLISION_48 = 1 << 17,
    }
}

impl AreaFlags {
    /// Bits computed after loading; whatever the file carries there is dropped.
    pub const DERIVED_MASK: u32 = !((1 << 10) - 1);
}

flag_set! {
    FaceFlags {
        SOLID = 1,
        LADDER = 2,
        GROUND = 4,
        GAP = 8,
        LIQUID = 16,
        LIQUID_SURFACE = 32,
        BRIDGE = 64,
    }
}

flag_set! {
    AreaContents {
        WATER = 1,
        LAVA = 2,
        SLIME = 4,
        CLUSTER_PORTAL = 8,
        TELEPORTAL = 16,
        ROUTE_PORTAL = 32,
        TELEPORTER = 64,
        JUMPPAD = 128,
        DO_NOT_ENTER = 256,
        VIEW_PORTAL = 512,
        MOVER = 1024,
        NOT_TEAM1 = 2048,
        NOT_TEAM2 = 4096,
    }
}

pub const PRESENCE_NORMAL: i32 = 2;
pub const PRESENCE_CROUCH: i32 = 4;

/// Axis-aligned box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl BBox {
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.mins).all() && p.cmple(self.maxs).all()
    }

    pub fn contains_2d(&self, p: Vec3) -> bool {
        p.x >= self.mins.x && p.x <= self.maxs.x && p.y >= self.mins.y && p.y <= self.maxs.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.mins.cmple(other.maxs).all() && self.maxs.cmpge(other.mins).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.mins + self.maxs) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.maxs - self.mins
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub kind: i32,
}

impl Plane {
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.dist
    }
}

/// Edge between two vertices.
#[derive(Clone, Copy, Debug, Default)]
pub struct Edge {
    pub v: [u32; 2],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Face {
    pub plane: u32,
    pub flags: FaceFlags,
    pub num_edges: u32,
    /// Index into the edge index lump. Entries there are signed edge numbers.
    pub first_edge: u32,
    pub front_area: u32,
    pub back_area: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Area {
    pub num: u32,
    pub num_faces: u32,
    /// Index into the face index lump. Entries there are signed face numbers.
    pub first_face: u32,
    pub bounds: BBox,
    pub center: Vec3,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AreaSettings {
    pub contents: AreaContents,
    pub flags: AreaFlags,
    pub presence_type: i32,
    /// Positive: cluster number. Negative: minus the portal number.
    pub cluster: i32,
    /// Index of the area inside its cluster.
    pub cluster_area_num: u32,
    pub num_reach: u32,
    pub first_reach: u32,
}

impl AreaSettings {
    #[inline]
    pub fn is_portal(&self) -> bool {
        self.cluster < 0
    }

    pub fn reach_range(&self) -> std::ops::Range<usize> {
        let first = self.first_reach as usize;
        first..first + self.num_reach as usize
    }
}

/// Directed edge from the owning area to `area`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reachability {
    /// Target area.
    pub area: u32,
    pub face: i32,
    pub edge: i32,
    pub start: Vec3,
    pub end: Vec3,
    /// Travel type in the low 24 bits, team restrictions above.
    pub travel_type: u32,
    pub travel_time: u16,
}

impl Reachability {
    #[inline]
    pub fn kind(&self) -> Option<super::TravelType> {
        super::TravelType::from_raw(self.travel_type & super::travel::TRAVELTYPE_MASK)
    }
}

/// BSP node. A positive child is a node index, a negative child is minus an
/// area number and zero is solid space.
#[derive(Clone, Copy, Debug, Default)]
pub struct BspNode {
    pub plane: u32,
    pub children: [i32; 2],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Portal {
    pub area: u32,
    pub front_cluster: u32,
    pub back_cluster: u32,
    /// Index of the portal area inside the front and back cluster.
    pub cluster_area_num: [u32; 2],
}

impl Portal {
    /// The cluster on the other side of `cluster`.
    pub fn other_cluster(&self, cluster: u32) -> u32 {
        if self.front_cluster == cluster {
            self.back_cluster
        } else {
            self.front_cluster
        }
    }

    pub fn touches(&self, cluster: u32) -> bool {
        self.front_cluster == cluster || self.back_cluster == cluster
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Cluster {
    pub num_areas: u32,
    pub num_reach_areas: u32,
    pub num_portals: u32,
    pub first_portal: u32,
}

impl Cluster {
    pub fn portal_range(&self) -> std::ops::Range<usize> {
        let first = self.first_portal as usize;
        first..first + self.num_portals as usize
    }
}
