//! Standard chess rules backed by the `chess` crate, with FEN positions.

use crate::{Color, RulesEngine, RulesError, TerminalStatus};
use chess::{BitBoard, Board, BoardStatus, ChessMove, MoveGen, Piece};
use std::str::FromStr;
use tracing::{debug, instrument};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Orthodox chess. Positions are FEN strings; moves are SAN (`Nf3`, `O-O`,
/// `e8=Q`), with coordinate notation (`g1f3`) accepted as a fallback.
///
/// The halfmove clock and fullmove number are carried from one position to
/// the next; the fifty-move rule is not applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardChess;

impl StandardChess {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    fn board(position: &str) -> Result<Board, RulesError> {
        Board::from_str(position).map_err(|_| RulesError::InvalidPosition(position.to_string()))
    }

    fn parse_move(board: &Board, notation: &str) -> Option<ChessMove> {
        // `from_san` wants promotions as `e8Q`, not `e8=Q`.
        let san = notation.trim().trim_end_matches(['+', '#']).replace('=', "");
        ChessMove::from_san(board, &san)
            .ok()
            .filter(|mv| board.legal(*mv))
            .or_else(|| {
                let coordinate = san.to_ascii_lowercase();
                MoveGen::new_legal(board).find(|mv| mv.to_string() == coordinate)
            })
    }

    /// Halfmove clock and fullmove number of a FEN, defaulting when absent.
    fn counters(position: &str) -> (u32, u32) {
        let mut fields = position.split_whitespace().skip(4);
        let halfmove = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let fullmove = fields.next().and_then(|f| f.parse().ok()).unwrap_or(1);
        (halfmove, fullmove)
    }

    /// FEN after `mv`, with the move counters advanced from `position`.
    fn next_position(board: &Board, mv: ChessMove, position: &str) -> String {
        let (halfmove, fullmove) = Self::counters(position);
        let resets = board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            || board.piece_on(mv.get_dest()).is_some();
        let halfmove = if resets { 0 } else { halfmove + 1 };
        let fullmove = match board.side_to_move() {
            chess::Color::Black => fullmove + 1,
            chess::Color::White => fullmove,
        };

        let fen = board.make_move_new(mv).to_string();
        let placement: Vec<&str> = fen.split_whitespace().take(4).collect();
        format!("{} {} {}", placement.join(" "), halfmove, fullmove)
    }

    fn insufficient_material(board: &Board) -> bool {
        let pieces = board.combined().popcnt();
        if pieces == 2 {
            return true;
        }
        let minors: BitBoard = *board.pieces(Piece::Knight) | *board.pieces(Piece::Bishop);
        pieces == 3 && minors.popcnt() == 1
    }
}

impl RulesEngine for StandardChess {
    fn initial_position(&self) -> String {
        STARTING_FEN.to_string()
    }

    fn side_to_move(&self, position: &str) -> Result<Color, RulesError> {
        Ok(match Self::board(position)?.side_to_move() {
            chess::Color::White => Color::White,
            chess::Color::Black => Color::Black,
        })
    }

    #[instrument(skip(self))]
    fn apply_move(&self, position: &str, notation: &str) -> Result<String, RulesError> {
        let board = Self::board(position)?;
        let mv = Self::parse_move(&board, notation).ok_or_else(|| {
            debug!("Engine rejected move");
            RulesError::IllegalMove(notation.to_string())
        })?;
        Ok(Self::next_position(&board, mv, position))
    }

    fn terminal_status(&self, position: &str) -> Result<Option<TerminalStatus>, RulesError> {
        let board = Self::board(position)?;
        Ok(match board.status() {
            BoardStatus::Checkmate => Some(TerminalStatus::Checkmate),
            BoardStatus::Stalemate => Some(TerminalStatus::Stalemate),
            BoardStatus::Ongoing if Self::insufficient_material(&board) => {
                Some(TerminalStatus::InsufficientMaterial)
            }
            BoardStatus::Ongoing => None,
        })
    }
}
