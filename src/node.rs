//! Search tree nodes with proof-number bookkeeping.
//!
//! Nodes live in an arena ([`SearchTree`]) and refer to each other through
//! [`NodeId`] indices. A node owns the list of its children; the parent link
//! is a plain index used for walking back to the root.
//!
//! Every node is classified once, at creation, as an OR node (the proof
//! player is to move) or an AND node (an opponent is to move), and carries a
//! proof and a disproof number following L. V. Allis' proof-number search:
//!
//! | evaluation | proof | disproof |
//! |------------|-------|----------|
//! | `True`     | 0     | ∞        |
//! | `False`    | ∞     | 0        |
//! | `Unknown`  | 1     | 1        |
//!
//! Once a node has children its numbers come from them instead: an OR node
//! takes the minimum proof and the summed disproof of its children, an AND
//! node the summed proof and the minimum disproof.

use crate::error::IterationError;
use crate::game::{draw_utilities, Game, PlayerId};

/// Index of a node inside its [`SearchTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Who is to move at a node, seen from the proof player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The proof player is to move.
    Or,
    /// An opponent is to move.
    And,
}

/// Value of a node as far as it is known without looking at children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Terminal, won by the proof player.
    True,
    /// Terminal, not won by the proof player.
    False,
    /// Not terminal.
    Unknown,
}

impl Evaluation {
    /// The (proof, disproof) pair of an unexpanded node with this value.
    pub fn proof_numbers(self) -> (f64, f64) {
        match self {
            Evaluation::True => (0.0, f64::INFINITY),
            Evaluation::False => (f64::INFINITY, 0.0),
            Evaluation::Unknown => (1.0, 1.0),
        }
    }
}

/// One position in the search tree.
pub struct SearchNode<G: Game> {
    parent: Option<NodeId>,
    mv: Option<G::Move>,
    state: G::State,
    mover: PlayerId,
    kind: NodeKind,
    evaluation: Evaluation,
    /// Utilities of a terminal node, cached at creation.
    outcome: Option<Vec<f64>>,
    pub(crate) visits: u32,
    /// Sum of backpropagated utilities, indexed by player.
    pub(crate) score_sums: Vec<f64>,
    /// All-moves-as-first visits and utility sums (RAVE).
    pub(crate) amaf_visits: u32,
    pub(crate) amaf_sums: Vec<f64>,
    proof: f64,
    disproof: f64,
    rank: u32,
    expanded: bool,
    children: Vec<NodeId>,
    /// Children created by `develop` that have not been handed out yet.
    unvisited: Vec<NodeId>,
    legal_moves: Vec<G::Move>,
}

impl<G: Game> SearchNode<G> {
    /// Build a node for `state` and evaluate it.
    ///
    /// A state the game calls non-terminal but that has no legal moves is
    /// treated as a finished, drawn game.
    fn new(
        game: &G,
        parent: Option<NodeId>,
        mv: Option<G::Move>,
        state: G::State,
        proof_player: PlayerId,
    ) -> Self {
        let players = game.num_players();
        let mover = game.mover(&state);
        let kind = if mover == proof_player {
            NodeKind::Or
        } else {
            NodeKind::And
        };

        let (legal_moves, outcome) = if game.is_terminal(&state) {
            (Vec::new(), Some(game.utilities(&state)))
        } else {
            let moves = game.legal_moves(&state);
            if moves.is_empty() {
                log::warn!("non-terminal state without legal moves, scoring it as a draw");
                (moves, Some(draw_utilities(players)))
            } else {
                (moves, None)
            }
        };

        let evaluation = match &outcome {
            Some(utilities) if utilities.get(proof_player) == Some(&1.0) => Evaluation::True,
            Some(_) => Evaluation::False,
            None => Evaluation::Unknown,
        };
        let (proof, disproof) = evaluation.proof_numbers();

        Self {
            parent,
            mv,
            state,
            mover,
            kind,
            evaluation,
            outcome,
            visits: 0,
            score_sums: vec![0.0; players + 1],
            amaf_visits: 0,
            amaf_sums: vec![0.0; players + 1],
            proof,
            disproof,
            rank: 0,
            expanded: false,
            children: Vec::new(),
            unvisited: Vec::new(),
            legal_moves,
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The move that led here from the parent. `None` at the root.
    #[inline]
    pub fn mv(&self) -> Option<&G::Move> {
        self.mv.as_ref()
    }

    #[inline]
    pub fn state(&self) -> &G::State {
        &self.state
    }

    #[inline]
    pub fn mover(&self) -> PlayerId {
        self.mover
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn evaluation(&self) -> Evaluation {
        self.evaluation
    }

    /// True for finished games, including malformed dead ends.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.evaluation != Evaluation::Unknown
    }

    /// Utilities of a terminal node.
    #[inline]
    pub fn outcome(&self) -> Option<&[f64]> {
        self.outcome.as_deref()
    }

    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits
    }

    /// Sum of utilities for `player` over all visits.
    #[inline]
    pub fn score_sum(&self, player: PlayerId) -> f64 {
        self.score_sums.get(player).copied().unwrap_or(0.0)
    }

    /// Average utility for `player`, 0 for an unvisited node.
    pub fn mean_score(&self, player: PlayerId) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.score_sum(player) / self.visits as f64
        }
    }

    /// Average AMAF utility for `player`, if any AMAF sample exists.
    pub fn amaf_mean(&self, player: PlayerId) -> Option<f64> {
        if self.amaf_visits == 0 {
            None
        } else {
            let sum = self.amaf_sums.get(player).copied().unwrap_or(0.0);
            Some(sum / self.amaf_visits as f64)
        }
    }

    #[inline]
    pub fn amaf_visits(&self) -> u32 {
        self.amaf_visits
    }

    #[inline]
    pub fn proof(&self) -> f64 {
        self.proof
    }

    #[inline]
    pub fn disproof(&self) -> f64 {
        self.disproof
    }

    /// Rank among siblings, 1 = best. 0 until the parent first ranks its children.
    #[inline]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of developed children not yet handed out for a first visit.
    #[inline]
    pub fn unvisited_len(&self) -> usize {
        self.unvisited.len()
    }

    #[inline]
    pub fn legal_moves(&self) -> &[G::Move] {
        &self.legal_moves
    }

    #[inline]
    pub fn is_proven(&self) -> bool {
        self.proof == 0.0
    }

    #[inline]
    pub fn is_disproven(&self) -> bool {
        self.disproof == 0.0
    }
}

/// Arena holding every node of one search.
pub struct SearchTree<G: Game> {
    nodes: Vec<SearchNode<G>>,
    proof_player: PlayerId,
}

impl<G: Game> SearchTree<G> {
    /// Create a tree whose root is `state`.
    pub fn new(game: &G, state: G::State, proof_player: PlayerId) -> Self {
        let root = SearchNode::new(game, None, None, state, proof_player);
        Self {
            nodes: vec![root],
            proof_player,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    pub fn proof_player(&self) -> PlayerId {
        self.proof_player
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &SearchNode<G> {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut SearchNode<G> {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of all nodes, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<G> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    fn allocate(&mut self, node: SearchNode<G>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Expand a node on its first visit.
    ///
    /// Every legal move becomes a child at once, and one of the new children
    /// is handed out uniformly at random for this iteration. A terminal node
    /// is only marked as expanded and returned itself.
    pub fn develop(
        &mut self,
        game: &G,
        id: NodeId,
        rng: &mut fastrand::Rng,
    ) -> Result<NodeId, IterationError> {
        if self.get(id).is_terminal() {
            self.get_mut(id).expanded = true;
            return Ok(id);
        }

        let moves = self.get(id).legal_moves.clone();
        let mut created = Vec::with_capacity(moves.len());
        for mv in moves {
            let state = game.apply(&self.get(id).state, &mv);
            let child = SearchNode::new(game, Some(id), Some(mv), state, self.proof_player);
            created.push(self.allocate(child));
        }

        let node = self.get_mut(id);
        node.expanded = true;
        node.children.extend_from_slice(&created);
        node.unvisited = created;

        self.take_unvisited(id, rng)
            .ok_or(IterationError::EmptyDevelopment(id.index()))
    }

    /// Hand out a random child that has not had its first visit yet.
    pub fn take_unvisited(&mut self, id: NodeId, rng: &mut fastrand::Rng) -> Option<NodeId> {
        let unvisited = &mut self.get_mut(id).unvisited;
        if unvisited.is_empty() {
            None
        } else {
            let pick = rng.usize(..unvisited.len());
            Some(unvisited.swap_remove(pick))
        }
    }

    /// Recompute the proof and disproof numbers of `id` from its children.
    ///
    /// Returns whether either number changed. Nodes without children fall
    /// back to their own evaluation.
    pub fn update_proof_disproof(&mut self, id: NodeId) -> bool {
        let node = self.get(id);
        let (proof, disproof) = if node.expanded && !node.children.is_empty() {
            let children = node.children.iter().map(|&c| self.get(c));
            match node.kind {
                NodeKind::And => children.fold((0.0, f64::INFINITY), |(pn, dn), c| {
                    (pn + c.proof, f64::min(dn, c.disproof))
                }),
                NodeKind::Or => children.fold((f64::INFINITY, 0.0), |(pn, dn), c| {
                    (f64::min(pn, c.proof), dn + c.disproof)
                }),
            }
        } else {
            node.evaluation.proof_numbers()
        };

        let node = self.get_mut(id);
        let changed = node.proof != proof || node.disproof != disproof;
        node.proof = proof;
        node.disproof = disproof;
        changed
    }

    /// Rank the children of `id`, best first.
    ///
    /// Children of an OR node are ordered by proof number, children of an
    /// AND node by disproof number. Equal values share a rank.
    pub fn rank_children(&mut self, id: NodeId) {
        let node = self.get(id);
        let kind = node.kind;
        let key = |c: &SearchNode<G>| match kind {
            NodeKind::Or => c.proof,
            NodeKind::And => c.disproof,
        };

        let mut order: Vec<(NodeId, f64)> = node
            .children
            .iter()
            .map(|&c| (c, key(self.get(c))))
            .collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut previous: Option<(f64, u32)> = None;
        for (position, (child, value)) in order.into_iter().enumerate() {
            let rank = match previous {
                Some((last, rank)) if last == value => rank,
                _ => position as u32 + 1,
            };
            self.get_mut(child).rank = rank;
            previous = Some((value, rank));
        }
    }

    /// Credit AMAF statistics to the children of `id`.
    ///
    /// `played` tells whether a move was played by the mover of `id` later
    /// in the current iteration.
    pub(crate) fn update_amaf(
        &mut self,
        id: NodeId,
        played: impl Fn(PlayerId, &G::Move) -> bool,
        utilities: &[f64],
    ) {
        let mover = self.get(id).mover;
        let children = self.get(id).children.clone();
        for child in children {
            let node = self.get_mut(child);
            let hit = node.mv.as_ref().is_some_and(|mv| played(mover, mv));
            if hit {
                node.amaf_visits += 1;
                for (sum, u) in node.amaf_sums.iter_mut().zip(utilities) {
                    *sum += u;
                }
            }
        }
    }
}
