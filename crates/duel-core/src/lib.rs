pub mod arena;
pub mod clock;
pub mod damage;
pub mod duel;
pub mod error;
pub mod profile;
pub mod protocol;
pub mod question;
pub mod queue;
pub mod rules;

pub use arena::{Arena, ArenaStatus, JoinOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use duel::{EndReason, Match, MatchStatus, Poll, RoundReport, Submission, Winner};
pub use error::DuelError;
pub use profile::{FixedGold, GoldSource, InventoryItem, PlayerProfile, ProfileBook, RandomGold};
pub use question::{BankError, Question, QuestionBank, QuestionView};
pub use queue::{MatchQueue, PendingRequest, PlayerRef};
pub use rules::DuelRules;
